use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_chars` characters, never splitting a code point.
pub fn take_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// `text` unchanged if it fits in `max_chars`, otherwise cut so that the
/// result including the trailing `...` is exactly `max_chars` long.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    format!("{}...", take_chars(text, keep))
}

/// Remove a file if it exists; missing files are fine.
pub fn remove_file_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Cleaned up file: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_titles_to_limit() {
        let long = "a".repeat(150);
        let title = truncate_with_ellipsis(&long, 100);
        assert_eq!(title.chars().count(), 100);
        assert!(title.ends_with("..."));
        assert_eq!(truncate_with_ellipsis("short", 100), "short");
        let exact = "b".repeat(100);
        assert_eq!(truncate_with_ellipsis(&exact, 100), exact);
    }

    #[test]
    fn take_chars_respects_code_points() {
        assert_eq!(take_chars("héllo", 2), "hé");
        assert_eq!(take_chars("hi", 10), "hi");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\n b\tc "), "a b c");
        assert_eq!(word_count("one two  three\nfour"), 4);
    }
}
