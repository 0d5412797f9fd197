use std::collections::HashMap;

#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One complete reading of host metrics at a single instant (spec §3).
///
/// Wire shape mirrors the live-metrics WebSocket frame (§6): `{timestamp,
/// node_id, metrics:{cpu{...}, memory{...}, disk{...}, network{...},
/// processes{...}}}`. `MetricSnapshot` here models the flattened `metrics`
/// payload; the WebSocket envelope wraps it (see `agent-server::broadcast`).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetricSnapshot {
    #[cfg(feature = "chrono")]
    pub timestamp: DateTime<Utc>,
    #[cfg(not(feature = "chrono"))]
    pub timestamp: String,
    pub host_id: String,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkStats,
    pub processes: ProcessStats,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CpuStats {
    pub overall_percent: f32,
    pub per_core_percent: Vec<f32>,
    pub load_avg_1m: f64,
    pub load_avg_5m: f64,
    pub load_avg_15m: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
    pub used_percent: f32,
    pub swap_total_bytes: u64,
    pub swap_used_bytes: u64,
    pub swap_used_percent: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MountUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub used_percent: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiskStats {
    /// Per-mount usage, keyed by mount point.
    pub usage: HashMap<String, MountUsage>,
    /// Aggregate read throughput in MiB/s. Zero on the first sample after
    /// startup (spec §4.3 — rate fields require a prior reading).
    pub read_mib_per_sec: f64,
    pub write_mib_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkStats {
    pub rx_mib_per_sec: f64,
    pub tx_mib_per_sec: f64,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
    pub rx_packets_total: u64,
    pub tx_packets_total: u64,
    pub active_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub memory_percent: f32,
    pub cpu_percent: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProcessStats {
    pub count: usize,
    /// Top-N by memory percent (N is configurable; spec §3, §4.3).
    pub top_by_memory: Vec<ProcessSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_has_zero_rates_by_construction() {
        let disk = DiskStats::default();
        assert_eq!(disk.read_mib_per_sec, 0.0);
        assert_eq!(disk.write_mib_per_sec, 0.0);
    }
}
