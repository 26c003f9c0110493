//! A small, dependency-free sentence boundary detector. Whisper-streaming's
//! source used a generic NLP library with a manual-split fallback; this port
//! ships only the fallback.

use shared_protocol::TimedWord;

/// Characters that terminate a sentence for the purposes of chunking and
/// translation batching.
pub const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '。', '！', '？', '।', '॥', '։', '؟'];

/// Split `text` at the last sentence terminator, returning
/// `(prefix_including_terminator, remainder)`, or `("", text)` if none is found.
/// Both parts are trimmed of surrounding whitespace.
pub fn split_at_sentence_end(text: &str) -> (String, String) {
    let last = text
        .char_indices()
        .filter(|(_, c)| SENTENCE_TERMINATORS.contains(c))
        .next_back();

    match last {
        Some((idx, c)) => {
            let split_at = idx + c.len_utf8();
            let prefix = text[..split_at].trim().to_string();
            let remainder = text[split_at..].trim().to_string();
            (prefix, remainder)
        }
        None => (String::new(), text.trim().to_string()),
    }
}

/// Split `text` at the last clause comma, returning `(prefix, remainder)`, or
/// `("", text)` if none is found.
pub fn split_at_comma(text: &str) -> (String, String) {
    match text.rfind(',') {
        Some(idx) => {
            let prefix = text[..idx].trim().to_string();
            let remainder = text[idx + 1..].trim().to_string();
            (prefix, remainder)
        }
        None => (String::new(), text.trim().to_string()),
    }
}

/// Group a flat word stream into `(beg, end, "sentence text")` tuples by
/// splitting on sentence terminators, matching each resulting sentence back
/// to its spanning words to recover precise timestamps.
pub fn words_to_sentences(words: &[TimedWord]) -> Vec<(f64, f64, String)> {
    let full_text: String = words.iter().map(|w| w.text.as_str()).collect::<Vec<_>>().join(" ");
    let sentences = split_into_sentences(&full_text);

    let mut out = Vec::new();
    let mut cursor = 0usize;
    for sentence in sentences {
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut beg: Option<f64> = None;
        let mut end: Option<f64> = None;
        let mut remaining = trimmed.to_string();
        while cursor < words.len() {
            let word = &words[cursor];
            let w = word.text.trim();
            if beg.is_none() && remaining.starts_with(w) {
                beg = Some(word.start);
            }
            let found_end = remaining == w;
            remaining = remaining[w.len().min(remaining.len())..].trim_start().to_string();
            cursor += 1;
            if found_end {
                end = Some(word.end);
                break;
            }
        }
        if let (Some(b), Some(e)) = (beg, end) {
            out.push((b, e, trimmed.to_string()));
        }
    }
    out
}

/// Split `text` into whole sentences (terminator included), keeping a final
/// unterminated fragment as its own trailing "sentence".
fn split_into_sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let char_indices: Vec<(usize, char)> = text.char_indices().collect();
    for &(idx, c) in &char_indices {
        if SENTENCE_TERMINATORS.contains(&c) {
            let end = idx + c.len_utf8();
            out.push(text[start..end].to_string());
            start = end;
        }
    }
    if start < text.len() {
        out.push(text[start..].to_string());
    }
    out
}
