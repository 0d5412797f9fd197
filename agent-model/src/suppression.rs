#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a Suppression Rule's lifetime is bounded (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DurationMode {
    Permanent,
    Timed,
    ExpiringAt,
}

/// Read-only view of one row from the external suppression rules store
/// (spec §3, §6).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SuppressionRule {
    pub id: String,
    pub name: String,
    pub match_text: String,
    /// `None` means the rule applies to every host (spec §4.7).
    pub host_filter: Option<String>,
    pub duration_mode: DurationMode,
    #[cfg(feature = "chrono")]
    pub expires_at: Option<DateTime<Utc>>,
    #[cfg(not(feature = "chrono"))]
    pub expires_at: Option<String>,
    pub enabled: bool,
    pub match_count: u64,
    #[cfg(feature = "chrono")]
    pub last_matched_at: Option<DateTime<Utc>>,
    #[cfg(not(feature = "chrono"))]
    pub last_matched_at: Option<String>,
}

impl SuppressionRule {
    /// A disabled or expired rule never suppresses (spec §3 invariant).
    pub fn is_active(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.expires_at {
            Some(expiry) => expiry > now,
            None => true,
        }
    }

    /// Case-sensitive substring match with optional host filter
    /// (spec §4.7).
    pub fn matches(&self, line: &str, host_id: &str) -> bool {
        let host_ok = match &self.host_filter {
            Some(filter) => filter == host_id,
            None => true,
        };
        host_ok && line.contains(self.match_text.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn rule(match_text: &str, host_filter: Option<&str>) -> SuppressionRule {
        SuppressionRule {
            id: "r1".into(),
            name: "test rule".into(),
            match_text: match_text.into(),
            host_filter: host_filter.map(String::from),
            duration_mode: DurationMode::Permanent,
            expires_at: None,
            enabled: true,
            match_count: 0,
            last_matched_at: None,
        }
    }

    #[test]
    fn disabled_rule_is_never_active() {
        let mut r = rule("connection refused", None);
        r.enabled = false;
        assert!(!r.is_active(Utc::now()));
    }

    #[test]
    fn expired_rule_is_never_active() {
        let mut r = rule("connection refused", None);
        r.duration_mode = DurationMode::Timed;
        r.expires_at = Some(Utc::now() - Duration::seconds(1));
        assert!(!r.is_active(Utc::now()));
    }

    #[test]
    fn match_is_case_sensitive_substring() {
        let r = rule("connection refused", None);
        assert!(r.matches("ERROR: connection refused to db", "host-1"));
        assert!(!r.matches("ERROR: Connection Refused to db", "host-1"));
    }

    #[test]
    fn host_filter_restricts_match() {
        let r = rule("timeout", Some("host-a"));
        assert!(r.matches("timeout waiting", "host-a"));
        assert!(!r.matches("timeout waiting", "host-b"));
    }
}
