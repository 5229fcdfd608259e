//! Turning a free-text description into a file-name-safe slug.

use regex::Regex;
use rslug::slugify;
use std::sync::LazyLock;

/// Various quotation marks: '"‘’“”„‛`«»‹›
const QUOTES: [char; 13] = [
    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}', '\u{0060}',
    '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
];

/// Chatter models like to put in front of the answer.
static PREAMBLE: LazyLock<Regex> = LazyLock::new(|| {
    // Infallible: constant pattern.
    Regex::new(r"(?i)^\s*(?:(?:the\s+)?file\s*name(?:\s+is\s*:?|\s*:)|here\s+is|description\s*:)\s*")
        .expect("valid preamble pattern")
});

const ARTICLES: [&str; 3] = ["a", "an", "the"];

/// Slugifies `description`.
///
/// The result only contains `[a-z0-9-]`, has no leading, trailing or doubled
/// hyphens, and is at most `max_len` bytes. Truncation happens at a hyphen
/// when there is one to cut at. Leading articles are dropped ("a login page"
/// names the same thing as "login page"). If nothing survives, `fallback` is
/// returned instead.
pub(crate) fn slug(description: &str, max_len: usize, fallback: &str) -> String {
    let mut text = description.trim().trim_matches(QUOTES.as_slice());
    while let Some(found) = PREAMBLE.find(text) {
        text = text[found.end()..].trim_matches(QUOTES.as_slice());
    }
    let stripped: String =
        text.chars().filter(|c| !QUOTES.contains(c)).map(|c| if c == '_' { ' ' } else { c }).collect();
    let slugged = slugify!(&stripped);

    let mut words: Vec<String> = slugged
        .split('-')
        .map(|w| w.chars().filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();
    while words.len() > 1 && ARTICLES.contains(&words[0].as_str()) {
        words.remove(0);
    }
    let joined = words.join("-");

    match truncate(&joined, max_len) {
        "" => fallback.to_string(),
        s => s.to_string(),
    }
}

/// `slug` is ASCII, so every byte index is a character boundary.
fn truncate(slug: &str, max_len: usize) -> &str {
    if slug.len() <= max_len {
        return slug;
    }
    let cut = &slug[..max_len];
    if slug.as_bytes()[max_len] == b'-' {
        return cut.trim_end_matches('-');
    }
    match cut.rfind('-') {
        Some(i) if i > 0 => &cut[..i],
        _ => cut,
    }
}
