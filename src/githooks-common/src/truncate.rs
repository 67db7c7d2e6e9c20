//! Text truncation utilities for hook output.

use std::borrow::Cow;

/// Marker placed in front of output whose head was dropped.
pub const TRUNCATION_MARKER: &str = "[... output truncated ...]\n";

/// Truncates a string to a maximum length, adding unicode ellipsis (…) if truncated.
///
/// # Examples
/// ```
/// use githooks_common::truncate::truncate_with_unicode_ellipsis;
///
/// assert_eq!(truncate_with_unicode_ellipsis("hello", 10), "hello");
/// assert_eq!(truncate_with_unicode_ellipsis("hello world", 6), "hello…");
/// ```
pub fn truncate_with_unicode_ellipsis(s: &str, max_len: usize) -> Cow<'_, str> {
    let char_count = s.chars().count();
    if char_count <= max_len {
        Cow::Borrowed(s)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        Cow::Owned(format!("{}…", truncated))
    }
}

/// Truncates text to a maximum length, taking only the first non-empty line.
///
/// Used for one-line warning summaries of a hook's output.
pub fn truncate_first_line(text: &str, max_len: usize) -> Cow<'_, str> {
    let first_line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    truncate_with_unicode_ellipsis(first_line, max_len)
}

/// Keeps the last `max_chars` characters of `s`.
///
/// Hooks usually print the reason for a failure last, so the tail is the part
/// worth keeping. When anything is dropped, [`TRUNCATION_MARKER`] is prepended
/// and the cut is moved forward to the next line start when one is available.
pub fn truncate_keep_tail(s: &str, max_chars: usize) -> Cow<'_, str> {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return Cow::Borrowed(s);
    }

    let skip = char_count - max_chars;
    let start = s
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len());
    let tail = &s[start..];

    // Avoid starting mid-line unless the tail is a single line.
    let tail = match tail.find('\n') {
        Some(nl) if nl + 1 < tail.len() => &tail[nl + 1..],
        _ => tail,
    };

    Cow::Owned(format!("{}{}", TRUNCATION_MARKER, tail))
}
