//! Word-bounded sliding-window chunking.

/// Splits `text` into windows of up to `max_words` whitespace-delimited
/// words. Consecutive windows overlap by `overlap` words (step is
/// `max_words - overlap`, minimum 1). The last window is the first one that
/// reaches the end of the text, so a text of W words produces
/// `ceil((W - max_words) / step) + 1` chunks when W > max_words, exactly one
/// chunk when W <= max_words, and none when the input is empty.
pub fn chunk_text(text: &str, max_words: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || max_words == 0 {
        return Vec::new();
    }

    let step = max_words.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}
