//! Per-connection session lifecycle: drains audio from a `Connection`,
//! drives an `OnlineProcessor`, and optionally chains translation, emitting
//! wire messages with the monotonic ordering guarantees from the concurrency
//! model.

use crate::connection::{Connection, ConnectionError, decode_pcm16};
use crate::online_processor::{EmittedSegment, OnlineProcessor};
use crate::recognizer::{Recognizer, RecognizerError};
use crate::translation::{AdaptiveTranslationBuffer, FlushReason, TranslationManager};
use shared_protocol::{ServerMessage, TranslationReason};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// Translation wiring for a session that has `--translate` enabled.
pub struct SessionTranslation {
    pub buffer: AdaptiveTranslationBuffer,
    pub manager: TranslationManager,
}

pub struct Session<R: Recognizer> {
    id: Uuid,
    processor: OnlineProcessor<R>,
    translation: Option<SessionTranslation>,
    min_chunk_samples: usize,
    last_emitted_end_ms: i64,
    last_emitted_translation_end_ms: i64,
    runtime: Handle,
}

impl<R: Recognizer> Session<R> {
    pub fn new(
        processor: OnlineProcessor<R>,
        translation: Option<SessionTranslation>,
        min_chunk_seconds: f64,
        runtime: Handle,
    ) -> Self {
        let min_chunk_samples = (min_chunk_seconds * shared_protocol::SAMPLE_RATE as f64).round() as usize;
        Self {
            id: Uuid::new_v4(),
            processor,
            translation,
            min_chunk_samples,
            last_emitted_end_ms: 0,
            last_emitted_translation_end_ms: 0,
            runtime,
        }
    }

    /// Drain the connection to completion, driving transcription (and
    /// translation, if configured) until the peer disconnects.
    pub fn run(&mut self, conn: &mut dyn Connection) -> Result<(), SessionError> {
        let _span = tracing::info_span!("session", session_id = %self.id).entered();
        info!("session started");

        let mut cold_start = true;
        loop {
            let Some(chunk) = self.receive_audio_chunk(conn, cold_start)? else {
                break;
            };
            cold_start = false;

            self.processor.insert_audio_chunk(&chunk);
            let emitted = self.processor.process_iter()?;
            if let Some(segment) = &emitted {
                self.emit_transcription(conn, segment)?;
            }

            if let Some(segment) = emitted {
                self.feed_translation(conn, &segment)?;
            } else {
                self.flush_idle_translation(conn)?;
            }
        }

        if let Some(segment) = self.processor.finish() {
            self.emit_transcription(conn, &segment)?;
            self.feed_translation(conn, &segment)?;
        }
        self.flush_translation_buffer(conn)?;

        info!("session ended");
        Ok(())
    }

    /// Concatenate audio bytes until at least `min_chunk_samples` float
    /// samples are available, or the peer closes. The very first chunk of a
    /// session is dropped if short (cold-start guard).
    fn receive_audio_chunk(&mut self, conn: &mut dyn Connection, cold_start: bool) -> Result<Option<Vec<f32>>, SessionError> {
        let mut samples: Vec<f32> = Vec::new();
        loop {
            let Some(bytes) = conn.receive_audio()? else {
                if cold_start && !samples.is_empty() && samples.len() < self.min_chunk_samples {
                    return Ok(None);
                }
                return Ok(if samples.is_empty() { None } else { Some(samples) });
            };
            samples.extend(decode_pcm16(&bytes));
            if samples.len() >= self.min_chunk_samples {
                return Ok(Some(samples));
            }
        }
    }

    fn emit_transcription(&mut self, conn: &mut dyn Connection, segment: &EmittedSegment) -> Result<(), SessionError> {
        let beg_ms = (segment.beg * 1000.0).round() as i64;
        let end_ms = (segment.end * 1000.0).round() as i64;
        let beg_ms = beg_ms.max(self.last_emitted_end_ms);
        let end_ms = end_ms.max(beg_ms);
        self.last_emitted_end_ms = end_ms;

        info!(beg_ms, end_ms, text = %segment.text, "committed transcription");
        conn.send(&ServerMessage::transcription(beg_ms, end_ms, segment.text.clone()))?;
        Ok(())
    }

    fn feed_translation(&mut self, conn: &mut dyn Connection, segment: &EmittedSegment) -> Result<(), SessionError> {
        let Some(translation) = &mut self.translation else { return Ok(()) };
        let beg_ms = (segment.beg * 1000.0).round() as i64;
        let end_ms = (segment.end * 1000.0).round() as i64;
        translation.buffer.add_text(&segment.text, beg_ms, end_ms);
        drain_translation_buffer(&self.runtime, translation, conn, &mut self.last_emitted_translation_end_ms)
    }

    fn flush_idle_translation(&mut self, conn: &mut dyn Connection) -> Result<(), SessionError> {
        let Some(translation) = &mut self.translation else { return Ok(()) };
        drain_translation_buffer(&self.runtime, translation, conn, &mut self.last_emitted_translation_end_ms)
    }

    fn flush_translation_buffer(&mut self, conn: &mut dyn Connection) -> Result<(), SessionError> {
        let Some(translation) = &mut self.translation else { return Ok(()) };
        let (to_translate, _remainder) = translation.buffer.get_text_to_translate();
        let Some((text, _)) = to_translate.filter(|(t, _)| !t.is_empty()) else { return Ok(()) };
        let (start_ms, end_ms) = translation.buffer.get_time_bounds();
        let translated = self.runtime.block_on(translation.manager.translate(text.clone()));
        translation.buffer.record_translation_ratio(text.len(), translated.len());
        translation.buffer.clear();
        emit_translation(
            conn,
            start_ms,
            end_ms,
            &text,
            &translated,
            Some(TranslationReason::FinalBuffer),
            &mut self.last_emitted_translation_end_ms,
        )?;
        Ok(())
    }
}

fn drain_translation_buffer(
    runtime: &Handle,
    translation: &mut SessionTranslation,
    conn: &mut dyn Connection,
    last_emitted_translation_end_ms: &mut i64,
) -> Result<(), SessionError> {
    loop {
        let (to_translate, remainder) = translation.buffer.get_text_to_translate();
        let Some((text, flush_reason)) = to_translate else { return Ok(()) };
        if text.is_empty() {
            return Ok(());
        }

        let (start_ms, end_ms) = translation.buffer.get_time_bounds();
        let translated = runtime.block_on(translation.manager.translate(text.clone()));
        translation.buffer.record_translation_ratio(text.len(), translated.len());
        translation.buffer.set_remainder(remainder, end_ms, end_ms);

        let reason = match flush_reason {
            FlushReason::Inactivity => Some(TranslationReason::InactivityTimeout),
            FlushReason::BufferAge
            | FlushReason::SentenceBoundary
            | FlushReason::CommaBoundary
            | FlushReason::TooLong => None,
        };
        emit_translation(conn, start_ms, end_ms, &text, &translated, reason, last_emitted_translation_end_ms)?;
    }
}

fn emit_translation(
    conn: &mut dyn Connection,
    start_ms: i64,
    end_ms: i64,
    original: &str,
    translated: &str,
    reason: Option<TranslationReason>,
    last_emitted_translation_end_ms: &mut i64,
) -> Result<(), SessionError> {
    let start_ms = start_ms.max(*last_emitted_translation_end_ms);
    let end_ms = end_ms.max(start_ms);
    *last_emitted_translation_end_ms = end_ms;

    info!(start_ms, end_ms, original, translated, ?reason, "translated");
    let message = ServerMessage::Translation {
        start: start_ms,
        end: end_ms,
        original: original.to_string(),
        translation: translated.to_string(),
        reason,
    };
    match conn.send(&message) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(error = %e, "failed to send translation");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online_processor::{BufferTrimming, BufferTrimmingConfig};
    use crate::recognizer::fake::ScriptedRecognizer;
    use shared_protocol::{RecognizedSegment, TimedWord};
    use std::collections::VecDeque;

    struct FakeConnection {
        audio_chunks: VecDeque<Vec<u8>>,
        sent: Vec<ServerMessage>,
    }

    impl FakeConnection {
        fn new(audio_chunks: Vec<Vec<u8>>) -> Self {
            Self { audio_chunks: audio_chunks.into(), sent: Vec::new() }
        }
    }

    impl Connection for FakeConnection {
        fn receive_audio(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
            Ok(self.audio_chunks.pop_front())
        }
        fn send(&mut self, message: &ServerMessage) -> Result<(), ConnectionError> {
            self.sent.push(message.clone());
            Ok(())
        }
    }

    fn pcm16_chunk(n_samples: usize) -> Vec<u8> {
        vec![0u8; n_samples * 2]
    }

    #[tokio::test]
    async fn run_emits_transcription_and_terminates_on_close() {
        let recognizer = ScriptedRecognizer::new(vec![vec![RecognizedSegment {
            words: vec![TimedWord::new(0.0, 0.5, "hi")],
            end: 0.5,
            no_speech_prob: None,
        }]]);
        let processor = OnlineProcessor::new(recognizer, BufferTrimmingConfig { mode: BufferTrimming::Segment, seconds: 15.0 });
        let runtime = tokio::runtime::Handle::current();
        let mut session = Session::new(processor, None, 0.5, runtime);

        let mut conn = FakeConnection::new(vec![pcm16_chunk(8000)]);
        session.run(&mut conn).unwrap();

        assert_eq!(conn.sent.len(), 1);
        match &conn.sent[0] {
            ServerMessage::Transcription { start, end, text } => {
                assert_eq!(*start, 0);
                assert_eq!(*end, 500);
                assert_eq!(text, "hi");
            }
            other => panic!("expected a transcription message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emitted_starts_never_precede_the_previous_end() {
        let w = |start, end, text| TimedWord::new(start, end, text);
        let recognizer = ScriptedRecognizer::new(vec![
            vec![RecognizedSegment {
                words: vec![w(0.0, 0.4, "hello"), w(0.4, 0.8, "world")],
                end: 0.8,
                no_speech_prob: None,
            }],
            vec![RecognizedSegment {
                words: vec![w(0.0, 0.4, "hello"), w(0.4, 0.8, "world"), w(0.8, 1.2, "today")],
                end: 1.2,
                no_speech_prob: None,
            }],
            vec![RecognizedSegment {
                words: vec![w(0.8, 1.2, "today"), w(1.2, 1.6, "folks")],
                end: 1.6,
                no_speech_prob: None,
            }],
        ]);
        let processor = OnlineProcessor::new(recognizer, BufferTrimmingConfig { mode: BufferTrimming::Segment, seconds: 15.0 });
        let runtime = tokio::runtime::Handle::current();
        let mut session = Session::new(processor, None, 0.1, runtime);

        let mut conn = FakeConnection::new(vec![pcm16_chunk(1600), pcm16_chunk(1600), pcm16_chunk(1600)]);
        session.run(&mut conn).unwrap();

        let transcriptions: Vec<_> = conn
            .sent
            .iter()
            .filter_map(|m| match m {
                ServerMessage::Transcription { start, end, text } => Some((*start, *end, text.clone())),
                _ => None,
            })
            .collect();
        // two commits during the loop ("hello world", then "today") plus the
        // unconfirmed tail ("folks") flushed by `finish` at end of stream.
        assert_eq!(transcriptions.len(), 3);

        let mut last_end = 0i64;
        for (start, end, _) in &transcriptions {
            assert!(*start >= last_end, "start {start} preceded previous end {last_end}");
            last_end = *end;
        }
    }
}
