//! The `Recognizer` capability: the speech recognizer is an external
//! collaborator, named here only by the interface this crate consumes.

use shared_protocol::RecognizedSegment;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("recognizer failed: {0}")]
    Failed(String),
}

/// A speech recognizer: given an audio window (mono f32 @ 16 kHz) and a
/// textual prompt built from already-committed context, returns time-stamped
/// segments anchored at the start of the audio window (i.e. `0.0` is the
/// first sample).
///
/// Implementations MUST be safe to invoke concurrently across sessions if a
/// single instance is shared by `Arc`; the bundled `whisper-rs` backend
/// serializes access per-session via its own `WhisperState`.
pub trait Recognizer: Send + Sync {
    fn transcribe(&self, audio: &[f32], prompt: &str) -> Result<Vec<RecognizedSegment>, RecognizerError>;

    /// The separator this recognizer's language convention uses to join
    /// words/sentences (" " for most languages, "" for e.g. Chinese/Japanese).
    fn word_separator(&self) -> &str {
        " "
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    /// A scripted recognizer for tests: returns one entry from `responses`
    /// per call, in order, ignoring the audio and prompt it's given.
    pub struct ScriptedRecognizer {
        responses: Mutex<std::collections::VecDeque<Vec<RecognizedSegment>>>,
    }

    impl ScriptedRecognizer {
        pub fn new(responses: Vec<Vec<RecognizedSegment>>) -> Self {
            Self { responses: Mutex::new(responses.into_iter().collect()) }
        }
    }

    impl Recognizer for ScriptedRecognizer {
        fn transcribe(&self, _audio: &[f32], _prompt: &str) -> Result<Vec<RecognizedSegment>, RecognizerError> {
            Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
        }
    }
}
