//! The online audio/transcript processor: owns the audio retention buffer,
//! prompts the recognizer with prior context, decides when to trim the
//! buffer, and emits committed text.

use crate::hypothesis_buffer::HypothesisBuffer;
use crate::recognizer::{Recognizer, RecognizerError};
use crate::sentence;
use shared_protocol::TimedWord;
use tracing::{debug, info};

const SAMPLE_RATE: f64 = shared_protocol::SAMPLE_RATE as f64;
const PROMPT_CHAR_BUDGET: usize = 200;
const HARD_CEILING_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTrimming {
    Sentence,
    Segment,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferTrimmingConfig {
    pub mode: BufferTrimming,
    pub seconds: f64,
}

impl Default for BufferTrimmingConfig {
    fn default() -> Self {
        Self { mode: BufferTrimming::Segment, seconds: 15.0 }
    }
}

/// `(beg_seconds, end_seconds, text)` for newly committed text, or `None` if
/// this iteration produced no commits.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedSegment {
    pub beg: f64,
    pub end: f64,
    pub text: String,
}

pub struct OnlineProcessor<R: Recognizer> {
    recognizer: R,
    trimming: BufferTrimmingConfig,
    audio_buffer: Vec<f32>,
    buffer_time_offset: f64,
    committed: Vec<TimedWord>,
    hypotheses: HypothesisBuffer,
}

impl<R: Recognizer> OnlineProcessor<R> {
    pub fn new(recognizer: R, trimming: BufferTrimmingConfig) -> Self {
        let mut proc = Self {
            recognizer,
            trimming,
            audio_buffer: Vec::new(),
            buffer_time_offset: 0.0,
            committed: Vec::new(),
            hypotheses: HypothesisBuffer::new(),
        };
        proc.init(0.0);
        proc
    }

    /// Reset all state; run at session start (and would be run again on a
    /// restart, though sessions in this design are single-use).
    pub fn init(&mut self, offset: f64) {
        self.audio_buffer.clear();
        self.committed.clear();
        self.buffer_time_offset = offset;
        self.hypotheses.reset(offset);
    }

    pub fn insert_audio_chunk(&mut self, samples: &[f32]) {
        self.audio_buffer.extend_from_slice(samples);
    }

    pub fn buffer_time_offset(&self) -> f64 {
        self.buffer_time_offset
    }

    pub fn audio_buffer_seconds(&self) -> f64 {
        self.audio_buffer.len() as f64 / SAMPLE_RATE
    }

    /// Build `(prompt, context)`: `prompt` is a ≤200-char suffix of committed
    /// text that has scrolled out of the audio buffer; `context` is the
    /// committed text still inside the buffer (transcribed again and ignored).
    fn prompt(&self) -> (String, String) {
        let split = self
            .committed
            .iter()
            .position(|w| w.end > self.buffer_time_offset)
            .unwrap_or(self.committed.len());

        let (scrolled_out, in_buffer) = self.committed.split_at(split);

        let mut prompt_words = Vec::new();
        let mut len = 0usize;
        for word in scrolled_out.iter().rev() {
            if len >= PROMPT_CHAR_BUDGET {
                break;
            }
            len += word.text.len() + 1;
            prompt_words.push(word.text.as_str());
        }
        prompt_words.reverse();

        let sep = self.recognizer.word_separator();
        let prompt = prompt_words.join(sep);
        let context = in_buffer.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(sep);
        (prompt, context)
    }

    /// Run one iteration: transcribe the current buffer, reconcile hypotheses,
    /// possibly trim, and return newly committed text (if any).
    pub fn process_iter(&mut self) -> Result<Option<EmittedSegment>, RecognizerError> {
        let (prompt, context) = self.prompt();
        debug!(prompt_len = prompt.len(), context_len = context.len(), "built recognizer prompt");

        let segments = self.recognizer.transcribe(&self.audio_buffer, &prompt)?;

        let words: Vec<TimedWord> = segments
            .iter()
            .filter(|seg| !seg.no_speech_prob.is_some_and(|p| p > 0.9))
            .flat_map(|seg| seg.words.iter().cloned())
            .collect();

        self.hypotheses.insert(&words, self.buffer_time_offset);
        let newly = self.hypotheses.flush();
        self.committed.extend(newly.iter().cloned());

        if !newly.is_empty() && self.trimming.mode == BufferTrimming::Sentence {
            if self.audio_buffer_seconds() > self.trimming.seconds {
                self.chunk_completed_sentence();
            }
        }

        let segment_limit = match self.trimming.mode {
            BufferTrimming::Segment => self.trimming.seconds,
            BufferTrimming::Sentence => HARD_CEILING_SECS,
        };
        if self.audio_buffer_seconds() > segment_limit {
            self.chunk_completed_segment(&segments);
        }

        Ok(to_emitted(&newly, self.recognizer.word_separator()))
    }

    fn chunk_completed_sentence(&mut self) {
        if self.committed.is_empty() {
            return;
        }
        let mut sentences = sentence::words_to_sentences(&self.committed);
        if sentences.len() < 2 {
            return;
        }
        while sentences.len() > 2 {
            sentences.remove(0);
        }
        let chunk_at = sentences[sentences.len() - 2].1;
        info!(chunk_at, "chunking audio buffer at sentence boundary");
        self.chunk_at(chunk_at);
    }

    fn chunk_completed_segment(&mut self, segments: &[shared_protocol::RecognizedSegment]) {
        let Some(last_committed) = self.committed.last() else { return };
        let t = last_committed.end;

        let mut ends: Vec<f64> = segments.iter().map(|s| s.end).collect();
        if ends.len() <= 1 {
            return;
        }

        let mut e = ends[ends.len() - 2] + self.buffer_time_offset;
        while ends.len() > 2 && e > t {
            ends.pop();
            e = ends[ends.len() - 2] + self.buffer_time_offset;
        }
        if e <= t {
            info!(chunk_at = e, "chunking audio buffer at segment boundary");
            self.chunk_at(e);
        }
    }

    fn chunk_at(&mut self, time: f64) {
        self.hypotheses.pop_committed(time);
        let cut_samples = ((time - self.buffer_time_offset) * SAMPLE_RATE).round() as usize;
        let cut_samples = cut_samples.min(self.audio_buffer.len());
        self.audio_buffer.drain(..cut_samples);
        self.buffer_time_offset = time;
    }

    /// Flush the unconfirmed tail at end of stream, without committing it.
    pub fn finish(&mut self) -> Option<EmittedSegment> {
        let tail = self.hypotheses.complete();
        self.buffer_time_offset += self.audio_buffer_seconds();
        to_emitted(&tail, self.recognizer.word_separator())
    }
}

fn to_emitted(words: &[TimedWord], separator: &str) -> Option<EmittedSegment> {
    if words.is_empty() {
        return None;
    }
    let text = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(separator);
    Some(EmittedSegment { beg: words[0].start, end: words[words.len() - 1].end, text })
}
