//! Reading `#N` tokens out of text.

use crate::types::SequenceNumber;

/// Reads the sequence number a published post starts with.
///
/// Matches `#<digits>` at the very start of the text, followed by
/// whitespace. This is the shape [`super::Reconciler`] publishes, so it is
/// deliberately strict: `#5!` or ` #5 ` do not count.
///
/// # Examples
///
/// ```
/// use confessions_bot::sequence::parse_leading_index;
/// use confessions_bot::types::SequenceNumber;
///
/// assert_eq!(parse_leading_index("#12 hello"), Some(SequenceNumber(12)));
/// assert_eq!(parse_leading_index("#12"), None);
/// assert_eq!(parse_leading_index("hello #12 x"), None);
/// ```
pub fn parse_leading_index(text: &str) -> Option<SequenceNumber> {
    let rest = text.strip_prefix('#')?;
    let (number, rest) = split_digits(rest)?;
    rest.chars()
        .next()
        .filter(|c| c.is_whitespace())
        .map(|_| number)
}

/// Reads a cross-reference to an earlier item from a submission.
///
/// After optional leading whitespace, the text must start with `#N` or `@N`
/// and the digits must end at a non-digit or the end of the text.
///
/// # Examples
///
/// ```
/// use confessions_bot::sequence::parse_reference;
/// use confessions_bot::types::SequenceNumber;
///
/// assert_eq!(parse_reference("#12 I agree"), Some(SequenceNumber(12)));
/// assert_eq!(parse_reference("  @7, me too"), Some(SequenceNumber(7)));
/// assert_eq!(parse_reference("about #12"), None);
/// ```
pub fn parse_reference(text: &str) -> Option<SequenceNumber> {
    let text = text.trim_start();
    let rest = text
        .strip_prefix('#')
        .or_else(|| text.strip_prefix('@'))?;
    split_digits(rest).map(|(number, _)| number)
}

/// Splits a leading run of ASCII digits off `text`.
fn split_digits(text: &str) -> Option<(SequenceNumber, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let number = text[..end].parse::<u64>().ok()?;
    Some((SequenceNumber(number), &text[end..]))
}
