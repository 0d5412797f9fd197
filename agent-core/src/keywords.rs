use std::sync::Arc;

use arc_swap::ArcSwap;
use regex::Regex;

/// Builds a single case-insensitive, word-boundary alternation regex from
/// a keyword list (spec §4.1: "a line is a candidate when the keyword
/// regex matches with word-boundary semantics, case-insensitive"). Held
/// behind an `ArcSwap` so the hot-reload path (spec §4.8: "error-keyword
/// set (regex is rebuilt atomically)") can replace it without a lock.
#[derive(Debug)]
pub struct KeywordMatcher {
    regex: ArcSwap<Regex>,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String]) -> Self {
        Self { regex: ArcSwap::from_pointee(build_regex(keywords)) }
    }

    pub fn is_candidate(&self, line: &str) -> bool {
        self.regex.load().is_match(line)
    }

    pub fn rebuild(&self, keywords: &[String]) {
        self.regex.store(Arc::new(build_regex(keywords)));
    }
}

/// A regex that cannot match any string, including the empty string: it
/// requires consuming one character outside the universal character class.
fn never_matches_regex() -> Regex {
    Regex::new(r"[^\s\S]").expect("never-matches regex is valid")
}

fn build_regex(keywords: &[String]) -> Regex {
    if keywords.is_empty() {
        // Never matches; an empty keyword set means "no line is ever a
        // candidate" rather than "every line is".
        return never_matches_regex();
    }
    let alternation = keywords.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
    let pattern = format!(r"(?i)\b(?:{})\b", alternation);
    Regex::new(&pattern).unwrap_or_else(|_| never_matches_regex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_configured_keyword_case_insensitively() {
        let matcher = KeywordMatcher::new(&["error".to_string(), "warn".to_string()]);
        assert!(matcher.is_candidate("ERROR: boom"));
        assert!(matcher.is_candidate("a Warning occurred"));
        assert!(!matcher.is_candidate("all green"));
    }

    #[test]
    fn rebuild_replaces_keyword_set_atomically() {
        let matcher = KeywordMatcher::new(&["error".to_string()]);
        assert!(!matcher.is_candidate("just a warn line"));
        matcher.rebuild(&["warn".to_string()]);
        assert!(matcher.is_candidate("just a warn line"));
        assert!(!matcher.is_candidate("an error line"));
    }

    #[test]
    fn empty_keyword_set_never_matches() {
        let matcher = KeywordMatcher::new(&[]);
        assert!(!matcher.is_candidate("error everywhere"));
    }
}
