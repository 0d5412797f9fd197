use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-component liveness, surfaced in `/api/health` (spec §6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ComponentStatus {
    Running,
    Stopped,
    Degraded,
}

/// `{status, node_id, version, uptime_seconds, components{...}}`
/// (spec §6).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HealthReport {
    pub status: String,
    pub node_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentStatus>,
}
