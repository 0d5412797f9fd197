#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::metric::MetricSnapshot;

/// One row of the durable telemetry spool (spec §3, §6: `id, timestamp,
/// payload, retry_count, created_at, last_attempt_at`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpoolEntry {
    pub id: i64,
    pub snapshot: MetricSnapshot,
    pub retry_count: u32,
    #[cfg(feature = "chrono")]
    pub created_at: DateTime<Utc>,
    #[cfg(not(feature = "chrono"))]
    pub created_at: String,
    #[cfg(feature = "chrono")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[cfg(not(feature = "chrono"))]
    pub last_attempt_at: Option<String>,
}

/// Observability summary returned by `Stats()` (spec §4.4).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpoolStats {
    pub total: u64,
    pub by_retry_count: std::collections::BTreeMap<u32, u64>,
    #[cfg(feature = "chrono")]
    pub oldest_timestamp: Option<DateTime<Utc>>,
    #[cfg(not(feature = "chrono"))]
    pub oldest_timestamp: Option<String>,
}
