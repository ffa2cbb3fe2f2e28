//! Text measurement helpers.

/// Number of whitespace-separated words containing at least one
/// alphanumeric character. Markdown markers such as `#` or `---` do not count.
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count()
}
