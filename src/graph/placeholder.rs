//! Placeholder tokens: `(ENT1)`, `(ENT2)`, …
//!
//! Placeholders are not a stored type; they are recognised structurally in
//! triple text. Every helper here matches whole tokens, so `(ENT1)` never
//! matches inside `(ENT10)`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(ENT\d+\)").expect("placeholder pattern compiles"));

/// Iterate placeholder tokens in `text`, left to right, duplicates included.
pub fn find_all(text: &str) -> impl Iterator<Item = &str> {
    PLACEHOLDER_RE.find_iter(text).map(|m| m.as_str())
}

/// Distinct placeholders in `text`, in order of first appearance.
pub fn distinct(text: &str) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for token in find_all(text) {
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

pub fn contains_any(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}

/// `true` when `text` is exactly one placeholder token.
pub fn is_placeholder(text: &str) -> bool {
    PLACEHOLDER_RE
        .find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

/// `true` when `text` mentions `token` and no other placeholder.
pub fn mentions_only(text: &str, token: &str) -> bool {
    let found = distinct(text);
    found.len() == 1 && found[0] == token
}

/// Replace every whole occurrence of `token` in `text` with `value`.
pub fn substitute(text: &str, token: &str, value: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let found = &caps[0];
            if found == token {
                value.to_string()
            } else {
                found.to_string()
            }
        })
        .into_owned()
}
