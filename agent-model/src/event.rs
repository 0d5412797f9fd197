#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::severity::{Priority, Severity};

/// Produced by a Tailer on a keyword match, consumed exactly once by the
/// Broker Publisher (spec §3).
///
/// Field names here are the wire contract for the outbound broker message
/// (spec §6): `{timestamp, system_ip, log_path, log_label, application,
/// log_line, severity, priority}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ErrorEvent {
    #[cfg(feature = "chrono")]
    pub timestamp: DateTime<Utc>,
    #[cfg(not(feature = "chrono"))]
    pub timestamp: String,
    #[cfg_attr(feature = "serde", serde(rename = "system_ip"))]
    pub host_id: String,
    pub log_path: String,
    pub log_label: String,
    pub application: String,
    pub log_line: String,
    pub severity: Severity,
    pub priority: Priority,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn serializes_with_stable_field_names() {
        let event = ErrorEvent {
            timestamp: Utc::now(),
            host_id: "host-1".into(),
            log_path: "/var/log/app.log".into(),
            log_label: "app.log".into(),
            application: "agentd".into(),
            log_line: "ERROR: boom".into(),
            severity: Severity::Error,
            priority: Priority::High,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["system_ip"], "host-1");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["priority"], "high");
    }
}
