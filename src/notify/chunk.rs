//! Splitting long text into sendable chunks.

/// Per-message character ceiling. The platform allows 640; 600 leaves room
/// for the template wrapper.
pub const MAX_MESSAGE_LENGTH: usize = 600;

/// Splits `text` into consecutive chunks of at most `max_chars` characters.
///
/// Splits on character boundaries, never inside a UTF-8 sequence. Always
/// returns at least one chunk; only the last one can be shorter than
/// `max_chars`, and it is never empty unless `text` is.
///
/// # Examples
///
/// ```
/// use confessions_bot::notify::chunk_text;
///
/// assert_eq!(chunk_text("abcdefg", 3), vec!["abc", "def", "g"]);
/// assert_eq!(chunk_text("abc", 3), vec!["abc"]);
/// assert_eq!(chunk_text("", 3), vec![""]);
/// ```
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return vec![text.to_string()];
    }
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
