//! The concrete `Recognizer` wired against `whisper-rs`, adapted from the
//! accumulate-and-transcribe approach this codebase's older transcriber used,
//! but recast as a single stateless-from-the-outside `transcribe` call since
//! buffer retention now lives in `streamscribe_engine::OnlineProcessor`.

use anyhow::{Context, Result};
use shared_protocol::{RecognizedSegment, TimedWord};
use std::sync::Mutex;
use streamscribe_engine::{Recognizer, RecognizerError};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperState};

pub struct WhisperRecognizer {
    ctx: std::sync::Arc<WhisperContext>,
    state: Mutex<WhisperState>,
    language: Option<String>,
    sampling_strategy: SamplingStrategy,
}

impl WhisperRecognizer {
    pub fn new(
        ctx: std::sync::Arc<WhisperContext>,
        language: Option<String>,
        sampling_strategy: SamplingStrategy,
    ) -> Result<Self> {
        let state = ctx.create_state().context("failed to create whisper state")?;
        Ok(Self { ctx, state: Mutex::new(state), language, sampling_strategy })
    }
}

impl Recognizer for WhisperRecognizer {
    fn transcribe(&self, audio: &[f32], prompt: &str) -> Result<Vec<RecognizedSegment>, RecognizerError> {
        let mut params = FullParams::new(self.sampling_strategy.clone());
        params.set_language(self.language.as_deref());
        params.set_suppress_nst(true);
        params.set_print_progress(false);
        params.set_print_special(false);
        params.set_print_realtime(false);
        params.set_token_timestamps(true);
        params.set_no_context(true);
        if !prompt.is_empty() {
            params.set_initial_prompt(prompt);
        }

        let mut state = self.state.lock().expect("whisper state mutex poisoned");
        state.full(params, audio).map_err(|e| RecognizerError::Failed(e.to_string()))?;

        let n_segments = state.full_n_segments();
        let eot_id = self.ctx.token_eot();
        let mut segments = Vec::new();

        for i in 0..n_segments {
            let Some(segment) = state.get_segment(i) else { continue };
            let mut words = Vec::new();
            for j in 0..segment.n_tokens() {
                let Some(token) = segment.get_token(j) else { continue };
                if token.token_id() >= eot_id {
                    continue;
                }
                let Ok(text) = token.to_str_lossy() else { continue };
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                let data = token.token_data();
                words.push(TimedWord::new(data.t0 as f64 / 100.0, data.t1 as f64 / 100.0, text.to_string()));
            }
            if words.is_empty() {
                continue;
            }
            let end = segment.end_timestamp() as f64 / 100.0;
            segments.push(RecognizedSegment { words, end, no_speech_prob: Some(segment.no_speech_probability()) });
        }

        Ok(segments)
    }
}
