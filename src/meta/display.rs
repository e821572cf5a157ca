//! Human-friendly labels derived from identifiers.

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// Any character followed by a capitalized word (`FOOBar` -> `FOO Bar`).
    static ref WORD_START: Regex = Regex::new(r"(.)([A-Z][a-z]+)").unwrap();
    /// Lowercase or digit followed by an uppercase letter (`fooBar` -> `foo Bar`).
    static ref CASE_BOUNDARY: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
    /// A word, optionally with one internal apostrophe.
    static ref WORD: Regex = Regex::new(r"[A-Za-z]+('[A-Za-z]+)?").unwrap();
    /// Memoized results, shared by all extraction threads.
    static ref MEMO: RwLock<HashMap<String, String>> = RwLock::new(HashMap::new());
}

/// Convert an identifier into a display name.
///
/// `fooBarBaz` -> `Foo Bar Baz`, `FOOBar` -> `FOO Bar`,
/// `under_score` -> `Under Score`, `don't_stop` -> `Don't Stop`.
pub fn display_name(name: &str) -> String {
    if let Ok(memo) = MEMO.read() {
        if let Some(hit) = memo.get(name) {
            return hit.clone();
        }
    }

    let converted = convert(name);
    if let Ok(mut memo) = MEMO.write() {
        memo.insert(name.to_string(), converted.clone());
    }
    converted
}

fn convert(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let spaced = WORD_START.replace_all(&spaced, "${1} ${2}");
    let spaced = CASE_BOUNDARY.replace_all(&spaced, "${1} ${2}");

    WORD.replace_all(&spaced, |caps: &Captures| {
        let word = &caps[0];
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }
    })
    .into_owned()
}
