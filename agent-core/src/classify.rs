use agent_model::prelude::{Priority, Severity};

/// Case-insensitive, first-match-wins severity classification in the fixed
/// order defined by the spec (§4.1): critical, then failure, then error,
/// then warn, else info. This ordering — not the configurable candidate
/// keyword set — is what "severity is the maximum over matched keywords"
/// (P2) means in practice: within a line, the highest-ranked bucket whose
/// words appear wins.
const CRITICAL_WORDS: &[&str] = &["panic", "fatal", "critical", "crit"];
const FAILURE_WORDS: &[&str] = &["fail", "failed", "failure"];
const ERROR_WORDS: &[&str] = &["err", "error"];
const WARN_WORDS: &[&str] = &["warn", "warning"];

/// Priority is only ever upgraded, never downgraded, from the File Spec's
/// configured priority (§4.1, P3).
const CRITICAL_UPGRADE_WORDS: &[&str] = &["fatal", "panic", "kernel panic", "out of memory", "segmentation fault"];
const HIGH_UPGRADE_WORDS: &[&str] = &["error", "failed", "exception", "denied", "timeout"];

fn contains_any_word(line_lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| contains_word_boundary(line_lower, w))
}

/// A conservative word-boundary check: the match is not immediately
/// preceded or followed by an alphanumeric character. Works on the
/// already-lowercased line and lowercased needle.
fn contains_word_boundary(haystack: &str, needle: &str) -> bool {
    let mut start = 0;
    while let Some(offset) = haystack[start..].find(needle) {
        let match_start = start + offset;
        let match_end = match_start + needle.len();
        let before_ok = haystack[..match_start].chars().next_back().is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[match_end..].chars().next().is_none_or(|c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = match_start + 1;
        if start >= haystack.len() {
            break;
        }
    }
    false
}

pub fn classify_severity(line: &str) -> Severity {
    let lower = line.to_ascii_lowercase();
    if contains_any_word(&lower, CRITICAL_WORDS) {
        Severity::Critical
    } else if contains_any_word(&lower, FAILURE_WORDS) {
        Severity::Failure
    } else if contains_any_word(&lower, ERROR_WORDS) {
        Severity::Error
    } else if contains_any_word(&lower, WARN_WORDS) {
        Severity::Warn
    } else {
        Severity::Info
    }
}

pub fn derive_priority(file_priority: Priority, line: &str) -> Priority {
    let lower = line.to_ascii_lowercase();
    let mut priority = file_priority;
    if contains_any_word(&lower, CRITICAL_UPGRADE_WORDS) {
        priority = priority.max(Priority::Critical);
    }
    if contains_any_word(&lower, HIGH_UPGRADE_WORDS) {
        priority = priority.max(Priority::High);
    }
    priority
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_words_win_over_lower_severities() {
        assert_eq!(classify_severity("kernel PANIC: everything is on fire, also a warn"), Severity::Critical);
    }

    #[test]
    fn plain_info_line_has_no_matches() {
        assert_eq!(classify_severity("connection established"), Severity::Info);
    }

    #[test]
    fn word_boundary_prevents_substring_false_positive() {
        // "errorless" and "warnings" are not standalone occurrences of
        // "error"/"err"/"warn" under word-boundary semantics.
        assert_eq!(classify_severity("warnings about errorless systems"), Severity::Info);
        assert_eq!(classify_severity("a harmless string"), Severity::Info);
        assert_eq!(classify_severity("a standalone error here"), Severity::Error);
    }

    #[test]
    fn priority_upgrades_to_critical_on_oom() {
        let p = derive_priority(Priority::Low, "process killed: out of memory");
        assert_eq!(p, Priority::Critical);
    }

    #[test]
    fn priority_upgrades_to_high_but_never_downgrades() {
        let p = derive_priority(Priority::Critical, "connection timeout");
        assert_eq!(p, Priority::Critical);
        let p2 = derive_priority(Priority::Low, "request timeout");
        assert_eq!(p2, Priority::High);
    }

    #[test]
    fn severity_is_deterministic_for_same_input() {
        let line = "ERROR: something failed";
        assert_eq!(classify_severity(line), classify_severity(line));
    }
}
