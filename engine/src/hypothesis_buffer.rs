//! LocalAgreement-1 hypothesis reconciliation: turns successive, overlapping
//! word hypotheses from a recognizer into a monotonic committed word stream.

use shared_protocol::TimedWord;
use tracing::trace;

/// Words are discarded from a fresh hypothesis if they start more than this
/// many seconds before what is already committed (absorbs recognizer jitter).
const STALE_TOLERANCE_SECS: f64 = 0.1;

/// A fresh hypothesis whose first word starts within this many seconds of
/// the last commit is a candidate for n-gram dedup against the committed tail.
const OVERLAP_WINDOW_SECS: f64 = 1.0;

/// Longest suffix/prefix run considered when deduplicating repeated recognizer
/// output at a hypothesis boundary.
const MAX_NGRAM: usize = 5;

#[derive(Debug, Default)]
pub struct HypothesisBuffer {
    /// Every word ever committed, in order. Never mutated, only popped from
    /// the front as it scrolls out of the prompt window.
    committed: Vec<TimedWord>,
    /// Carry-over candidates from the previous `insert` awaiting agreement.
    buffer: Vec<TimedWord>,
    /// The words from the most recent `insert` call not yet compared.
    new: Vec<TimedWord>,
    last_committed_time: f64,
}

impl HypothesisBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to a fresh state, as if just constructed, with commits timed
    /// from `offset` onward.
    pub fn reset(&mut self, offset: f64) {
        self.committed.clear();
        self.buffer.clear();
        self.new.clear();
        self.last_committed_time = offset;
    }

    pub fn last_committed_time(&self) -> f64 {
        self.last_committed_time
    }

    /// Replace the `new` queue with `words` shifted to the absolute timeline,
    /// dropping stale entries and deduplicating against the committed tail.
    pub fn insert(&mut self, words: &[TimedWord], time_offset: f64) {
        let shifted: Vec<TimedWord> = words.iter().map(|w| w.shifted(time_offset)).collect();

        self.new = shifted
            .into_iter()
            .filter(|w| w.start > self.last_committed_time - STALE_TOLERANCE_SECS)
            .collect();

        let Some(first) = self.new.first() else { return };
        if (first.start - self.last_committed_time).abs() >= OVERLAP_WINDOW_SECS {
            return;
        }

        let max_n = MAX_NGRAM.min(self.committed.len()).min(self.new.len());
        for n in (1..=max_n).rev() {
            let committed_tail = &self.committed[self.committed.len() - n..];
            let new_head = &self.new[..n];
            if committed_tail.iter().map(|w| w.text.as_str()).eq(new_head.iter().map(|w| w.text.as_str())) {
                trace!(n, "deduplicating repeated recognizer output at hypothesis boundary");
                self.new.drain(..n);
                break;
            }
        }
    }

    /// Promote the longest common prefix of `buffer` and `new` (matched by
    /// exact text equality) to `committed`, returning what was newly promoted.
    pub fn flush(&mut self) -> Vec<TimedWord> {
        let mut promoted = Vec::new();
        while !self.buffer.is_empty() && !self.new.is_empty() {
            if self.buffer[0].text != self.new[0].text {
                break;
            }
            let word = self.new.remove(0);
            self.buffer.remove(0);
            self.last_committed_time = word.end;
            self.committed.push(word.clone());
            promoted.push(word);
        }
        self.buffer = std::mem::take(&mut self.new);
        promoted
    }

    /// The current unconfirmed tail, without committing it.
    pub fn complete(&self) -> Vec<TimedWord> {
        self.buffer.clone()
    }

    /// Drop leading committed entries that end at or before `time` (they have
    /// scrolled out of the prompt window and no longer need to be retained).
    pub fn pop_committed(&mut self, time: f64) {
        let keep_from = self.committed.iter().position(|w| w.end > time).unwrap_or(self.committed.len());
        self.committed.drain(..keep_from);
    }

    pub fn committed(&self) -> &[TimedWord] {
        &self.committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(start: f64, end: f64, text: &str) -> TimedWord {
        TimedWord::new(start, end, text)
    }

    #[test]
    fn s1_local_agreement_single_commit() {
        let mut hb = HypothesisBuffer::new();

        let h1 = vec![w(0.0, 0.4, "hello"), w(0.4, 0.8, "world")];
        hb.insert(&h1, 0.0);
        let flushed = hb.flush();
        assert!(flushed.is_empty());
        assert_eq!(hb.complete(), h1);

        let h2 = vec![w(0.0, 0.4, "hello"), w(0.4, 0.8, "world"), w(0.8, 1.2, "today")];
        hb.insert(&h2, 0.0);
        let flushed = hb.flush();
        assert_eq!(flushed, vec![w(0.0, 0.4, "hello"), w(0.4, 0.8, "world")]);
        assert_eq!(hb.last_committed_time(), 0.8);
    }

    #[test]
    fn stale_words_are_discarded() {
        let mut hb = HypothesisBuffer::new();
        hb.reset(1.0);
        let words = vec![w(0.85, 0.95, "old"), w(1.2, 1.4, "new")];
        hb.insert(&words, 0.0);
        assert_eq!(hb.new.len(), 1);
        assert_eq!(hb.new[0].text, "new");
    }

    #[test]
    fn ngram_dedup_drops_repeated_tail() {
        let mut hb = HypothesisBuffer::new();
        hb.insert(&[w(0.0, 0.4, "hello"), w(0.4, 0.8, "world")], 0.0);
        hb.flush(); // becomes carry-over buffer
        hb.insert(&[w(0.0, 0.4, "hello"), w(0.4, 0.8, "world")], 0.0);
        hb.flush(); // both commit; last_committed_time == 0.8

        // Recognizer re-emits "world" near the overlap boundary before the
        // genuinely new word; the n-gram merge should drop the repeat.
        hb.insert(&[w(0.75, 0.8, "world"), w(0.8, 1.2, "again")], 0.0);
        assert_eq!(hb.new, vec![w(0.8, 1.2, "again")]);
    }

    #[test]
    fn pop_committed_drops_entries_ending_before_cutoff() {
        let mut hb = HypothesisBuffer::new();
        hb.insert(&[w(0.0, 0.4, "a"), w(0.4, 0.8, "b")], 0.0);
        hb.flush(); // nothing buffered yet; becomes the carry-over buffer
        hb.insert(&[w(0.0, 0.4, "a"), w(0.4, 0.8, "b")], 0.0);
        hb.flush(); // matches carry-over buffer exactly; both words commit
        assert_eq!(hb.committed().len(), 2);
        hb.pop_committed(0.4);
        assert_eq!(hb.committed().len(), 1);
        assert_eq!(hb.committed()[0].text, "b");
    }

    #[test]
    fn complete_returns_buffer_without_committing() {
        let mut hb = HypothesisBuffer::new();
        hb.insert(&[w(0.0, 0.4, "hello")], 0.0);
        hb.flush();
        let tail = hb.complete();
        assert_eq!(tail, vec![w(0.0, 0.4, "hello")]);
        assert!(hb.committed().is_empty());
    }
}
