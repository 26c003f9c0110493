//! Wire types shared between the line-oriented and message-oriented transports.
//!
//! Timing on the wire is always integer milliseconds; internally the engine
//! crate works in floating-point seconds and converts at the boundary.

use serde::{Deserialize, Serialize};

pub const SAMPLE_RATE: u32 = 16_000;

/// A single time-stamped word as produced by a `Recognizer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedWord {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TimedWord {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self { start, end, text: text.into() }
    }

    pub fn shifted(&self, offset: f64) -> Self {
        Self { start: self.start + offset, end: self.end + offset, text: self.text.clone() }
    }
}

/// One segment returned by a `Recognizer` call, carrying its own words and an
/// optional `no_speech_prob` heuristic (`None` means "recognizer doesn't expose
/// this; accept all words").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSegment {
    pub words: Vec<TimedWord>,
    pub end: f64,
    pub no_speech_prob: Option<f32>,
}

/// A client frame arriving on the message-oriented transport's text channel.
/// Binary frames carry raw PCM16 audio directly and are not represented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAudioFrame {
    pub audio: String,
}

/// Messages the server sends to the client, identical in shape across both
/// transports (the line transport flattens each variant to a plain line).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Transcription {
        start: i64,
        end: i64,
        text: String,
    },
    Translation {
        start: i64,
        end: i64,
        original: String,
        translation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<TranslationReason>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationReason {
    InactivityTimeout,
    FinalBuffer,
}

impl ServerMessage {
    pub fn transcription(start_ms: i64, end_ms: i64, text: impl Into<String>) -> Self {
        ServerMessage::Transcription { start: start_ms, end: end_ms, text: text.into() }
    }

    /// Render this message in the line-transport's plain-text shape:
    /// `<beg_ms> <end_ms> <text>`. Translation messages use the same shape,
    /// carrying the translated text.
    pub fn to_line(&self) -> String {
        match self {
            ServerMessage::Transcription { start, end, text } => format!("{start} {end} {text}"),
            ServerMessage::Translation { start, end, translation, .. } => {
                format!("{start} {end} {translation}")
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("ServerMessage always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcription_json_shape() {
        let msg = ServerMessage::transcription(0, 1720, "Takhle to je");
        let json = msg.to_json();
        assert_eq!(
            json,
            r#"{"type":"transcription","start":0,"end":1720,"text":"Takhle to je"}"#
        );
    }

    #[test]
    fn translation_json_omits_reason_when_absent() {
        let msg = ServerMessage::Translation {
            start: 0,
            end: 1720,
            original: "Takhle to je".into(),
            translation: "This is it".into(),
            reason: None,
        };
        assert!(!msg.to_json().contains("reason"));
    }

    #[test]
    fn translation_json_includes_reason_when_present() {
        let msg = ServerMessage::Translation {
            start: 0,
            end: 1720,
            original: "uh huh".into(),
            translation: "uh huh".into(),
            reason: Some(TranslationReason::InactivityTimeout),
        };
        assert!(msg.to_json().contains("\"reason\":\"inactivity_timeout\""));
    }

    #[test]
    fn line_shape_is_beg_end_text() {
        let msg = ServerMessage::transcription(0, 1720, "Takhle to je");
        assert_eq!(msg.to_line(), "0 1720 Takhle to je");
    }

    #[test]
    fn audio_frame_decodes_from_json() {
        let frame: ClientAudioFrame = serde_json::from_str(r#"{"audio":"AAA="}"#).unwrap();
        assert_eq!(frame.audio, "AAA=");
    }
}
