//! Gates committed transcript fragments into translation-sized chunks,
//! preferring sentence boundaries over raw length or time limits.

use crate::sentence;
use std::time::{Duration, Instant};

const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBufferConfig {
    pub min_length: usize,
    pub interval: Duration,
    pub max_buffer_time: Duration,
    pub inactivity_timeout: Duration,
}

impl Default for AdaptiveBufferConfig {
    fn default() -> Self {
        Self {
            min_length: 20,
            interval: Duration::from_secs(4),
            max_buffer_time: Duration::from_secs(5),
            inactivity_timeout: Duration::from_secs(2),
        }
    }
}

struct Fragment {
    text: String,
    start_ms: i64,
    end_ms: i64,
}

/// Which priority rule handed a chunk to the translator, carried through to
/// the wire so clients can tell an inactivity flush from an ordinary split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    Inactivity,
    BufferAge,
    SentenceBoundary,
    CommaBoundary,
    TooLong,
}

pub struct AdaptiveTranslationBuffer {
    config: AdaptiveBufferConfig,
    fragments: Vec<Fragment>,
    last_translation_time: Instant,
    last_text_time: Instant,
    adaptive_min_length: usize,
    max_length: usize,
    ratio_history: Vec<f64>,
}

impl AdaptiveTranslationBuffer {
    pub fn new(config: AdaptiveBufferConfig) -> Self {
        let now = Instant::now();
        let adaptive_min_length = config.min_length;
        Self {
            config,
            fragments: Vec::new(),
            last_translation_time: now,
            last_text_time: now,
            adaptive_min_length,
            max_length: 5 * adaptive_min_length,
            ratio_history: Vec::new(),
        }
    }

    pub fn add_text(&mut self, text: &str, start_ms: i64, end_ms: i64) {
        if text.is_empty() {
            return;
        }
        self.fragments.push(Fragment { text: text.to_string(), start_ms, end_ms });
        self.last_text_time = Instant::now();
    }

    fn joined(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    /// Decide whether to hand a chunk to the translator, per the priority
    /// order documented on the type. Returns `(to_translate, remainder)`,
    /// where `to_translate` carries the reason it was triggered.
    pub fn get_text_to_translate(&self) -> (Option<(String, FlushReason)>, String) {
        let s = self.joined();
        let now = Instant::now();

        if now.duration_since(self.last_text_time) > self.config.inactivity_timeout && !s.is_empty() {
            return (Some((s, FlushReason::Inactivity)), String::new());
        }
        if now.duration_since(self.last_translation_time) > self.config.max_buffer_time {
            return (Some((s, FlushReason::BufferAge)), String::new());
        }
        if s.len() < self.adaptive_min_length {
            return (None, s);
        }

        let (prefix, suffix) = sentence::split_at_sentence_end(&s);
        if !prefix.is_empty() && prefix.len() >= self.adaptive_min_length {
            return (Some((prefix, FlushReason::SentenceBoundary)), suffix);
        }

        let (prefix, suffix) = sentence::split_at_comma(&s);
        if !prefix.is_empty() && prefix.len() >= self.adaptive_min_length {
            return (Some((prefix, FlushReason::CommaBoundary)), suffix);
        }

        if s.len() >= self.max_length {
            return (Some((s, FlushReason::TooLong)), String::new());
        }

        (None, s)
    }

    /// Earliest start and latest end across currently buffered fragments.
    pub fn get_time_bounds(&self) -> (i64, i64) {
        let start = self.fragments.iter().map(|f| f.start_ms).min().unwrap_or(0);
        let end = self.fragments.iter().map(|f| f.end_ms).max().unwrap_or(0);
        (start, end)
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
        self.last_translation_time = Instant::now();
    }

    /// Re-seed the buffer with a single fragment (the undigested remainder
    /// from the last `get_text_to_translate` call) after a chunk is taken.
    pub fn set_remainder(&mut self, remainder: String, start_ms: i64, end_ms: i64) {
        self.clear();
        if !remainder.is_empty() {
            self.add_text(&remainder, start_ms, end_ms);
        }
    }

    /// Re-derive `adaptive_min_length` from recent translation char-ratios,
    /// tightening or loosening the sentence/clause-split threshold.
    pub fn record_translation_ratio(&mut self, source_len: usize, translated_len: usize) {
        if source_len == 0 {
            return;
        }
        self.ratio_history.push(translated_len as f64 / source_len as f64);
        if self.ratio_history.len() > HISTORY_WINDOW {
            self.ratio_history.remove(0);
        }
        let r = self.ratio_history.iter().sum::<f64>() / self.ratio_history.len() as f64;
        if r > 0.0 {
            let l = self.config.min_length as f64;
            let adapted = (l / r).round() as usize;
            self.adaptive_min_length = adapted.clamp((l * 0.25).floor() as usize, (l * 2.0).floor() as usize);
            self.max_length = 5 * self.adaptive_min_length;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_short_returns_none() {
        let buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig::default());
        let mut buf = buf;
        buf.add_text("hi", 0, 100);
        let (to_translate, remainder) = buf.get_text_to_translate();
        assert!(to_translate.is_none());
        assert_eq!(remainder, "hi");
    }

    #[test]
    fn s3_complete_sentence_splits_at_terminator() {
        let mut buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig { min_length: 5, ..Default::default() });
        buf.add_text("This is a sentence. And a trailing fragment", 0, 100);
        let (to_translate, remainder) = buf.get_text_to_translate();
        let (text, reason) = to_translate.expect("sentence boundary should trigger a flush");
        assert_eq!(text, "This is a sentence.");
        assert_eq!(reason, FlushReason::SentenceBoundary);
        assert_eq!(remainder, "And a trailing fragment");
    }

    #[test]
    fn s4_inactivity_flushes_short_leftover() {
        let mut buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig {
            min_length: 50,
            inactivity_timeout: Duration::from_millis(10),
            ..Default::default()
        });
        buf.add_text("too short to split", 0, 100);
        // below min_length, so without the inactivity path this would stay buffered
        std::thread::sleep(Duration::from_millis(20));
        let (to_translate, remainder) = buf.get_text_to_translate();
        let (text, reason) = to_translate.expect("inactivity timeout should trigger a flush");
        assert_eq!(text, "too short to split");
        assert_eq!(reason, FlushReason::Inactivity);
        assert_eq!(remainder, "");
    }

    #[test]
    fn too_long_forces_whole_buffer() {
        let mut buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig { min_length: 5, ..Default::default() });
        let long = "word ".repeat(10);
        buf.add_text(long.trim(), 0, 100);
        let (to_translate, remainder) = buf.get_text_to_translate();
        let (_, reason) = to_translate.expect("oversized buffer should trigger a flush");
        assert_eq!(reason, FlushReason::TooLong);
        assert_eq!(remainder, "");
    }

    #[test]
    fn adaptive_min_length_tracks_translation_ratio() {
        let mut buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig { min_length: 20, ..Default::default() });
        for _ in 0..5 {
            buf.record_translation_ratio(10, 5); // ratio 0.5, translation is shorter
        }
        // L_adaptive = round(20 / 0.5) = 40, clamped to floor(2*20) = 40
        assert_eq!(buf.adaptive_min_length, 40);
        assert_eq!(buf.max_length, 200);
    }

    #[test]
    fn clear_empties_fragments() {
        let mut buf = AdaptiveTranslationBuffer::new(AdaptiveBufferConfig::default());
        buf.add_text("some text", 0, 100);
        buf.clear();
        let (_, remainder) = buf.get_text_to_translate();
        assert_eq!(remainder, "");
    }
}
