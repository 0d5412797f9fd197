use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordered critical..info so that `a.max(b)` implements "severity is the
/// maximum over matched keywords" (spec §3, P2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Severity {
    Info,
    Warn,
    Error,
    Failure,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Failure => "failure",
            Severity::Error => "error",
            Severity::Warn => "warn",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// Ordered low..critical so priority upgrades (never downgrades, P3) are a
/// plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(ParsePriorityError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised priority tag: {0}")]
pub struct ParsePriorityError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_critical_highest() {
        assert!(Severity::Critical > Severity::Failure);
        assert!(Severity::Failure > Severity::Error);
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn priority_never_downgrades_under_max() {
        let base = Priority::Low;
        let upgraded = base.max(Priority::High);
        assert_eq!(upgraded, Priority::High);
        let unchanged = Priority::Critical.max(Priority::Low);
        assert_eq!(unchanged, Priority::Critical);
    }

    #[test]
    fn priority_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("bogus".parse::<Priority>().is_err());
    }
}
