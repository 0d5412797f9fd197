use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agent_model::prelude::{CpuStats, DiskStats, MemoryStats, MetricSnapshot, MountUsage, NetworkStats, ProcessSample, ProcessStats};
use chrono::Utc;
use rand::Rng;
use sysinfo::{Disks, Networks, System};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::alert::AlertEngine;
use crate::metrics::AgentMetrics;
use crate::telemetry::TelemetrySpool;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub host_id: String,
    pub interval: Duration,
    pub startup_jitter_max: Duration,
    pub top_n_processes: usize,
    pub collect_per_core: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            host_id: String::new(),
            interval: Duration::from_secs(agent_config::defaults::SAMPLER_INTERVAL_SECS),
            startup_jitter_max: Duration::from_secs(agent_config::defaults::SAMPLER_STARTUP_JITTER_MAX_SECS),
            top_n_processes: 10,
            collect_per_core: true,
        }
    }
}

struct PriorReading {
    at: Instant,
    rx_bytes: u64,
    tx_bytes: u64,
    disk_read_bytes: u64,
    disk_write_bytes: u64,
}

/// Periodic host metric collection (C6, spec §4.3). Dispatches every
/// snapshot to the Spool, the Live Metric Broadcaster (if subscribed),
/// and the Alert Engine.
pub struct MetricSampler {
    config: SamplerConfig,
    system: System,
    spool: Arc<TelemetrySpool>,
    live_tx: broadcast::Sender<MetricSnapshot>,
    alert_engine: Arc<AlertEngine>,
    metrics: Arc<AgentMetrics>,
    prior: Option<PriorReading>,
}

impl MetricSampler {
    pub fn new(config: SamplerConfig, spool: Arc<TelemetrySpool>, live_tx: broadcast::Sender<MetricSnapshot>, alert_engine: Arc<AlertEngine>, metrics: Arc<AgentMetrics>) -> Self {
        Self { config, system: System::new_all(), spool, live_tx, alert_engine, metrics, prior: None }
    }

    /// Runs the sample loop until `cancel` fires. Sleeps a random jitter
    /// (bounded by `startup_jitter_max`) before the first tick so a fleet
    /// of agents restarted together does not sample in lockstep (spec
    /// §4.3).
    pub async fn run(&mut self, cancel: CancellationToken) {
        let jitter = if self.config.startup_jitter_max.is_zero() { Duration::ZERO } else { Duration::from_millis(rand::rng().random_range(0..self.config.startup_jitter_max.as_millis() as u64)) };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(jitter) => {}
        }

        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&mut self) {
        let snapshot = self.collect();
        self.alert_engine.evaluate_snapshot(&snapshot).await;
        let _ = self.live_tx.send(snapshot.clone());
        match self.spool.enqueue(&snapshot).await {
            Ok(_) => self.metrics.record_snapshot_spooled(),
            Err(e) => tracing::error!(error = %e, "failed to enqueue metric snapshot to spool"),
        }
    }

    fn collect(&mut self) -> MetricSnapshot {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.system.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        let now = Instant::now();
        let load = System::load_average();
        let cpu = CpuStats {
            overall_percent: self.system.global_cpu_usage(),
            per_core_percent: if self.config.collect_per_core { self.system.cpus().iter().map(|c| c.cpu_usage()).collect() } else { Vec::new() },
            load_avg_1m: load.one,
            load_avg_5m: load.five,
            load_avg_15m: load.fifteen,
        };

        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let memory = MemoryStats {
            total_bytes: total,
            used_bytes: used,
            available_bytes: self.system.available_memory(),
            used_percent: if total > 0 { (used as f64 / total as f64 * 100.0) as f32 } else { 0.0 },
            swap_total_bytes: self.system.total_swap(),
            swap_used_bytes: self.system.used_swap(),
            swap_used_percent: if self.system.total_swap() > 0 { (self.system.used_swap() as f64 / self.system.total_swap() as f64 * 100.0) as f32 } else { 0.0 },
        };

        let disks = Disks::new_with_refreshed_list();
        let mut usage = HashMap::new();
        let mut disk_read_bytes = 0u64;
        let mut disk_write_bytes = 0u64;
        for disk in disks.list() {
            let total_bytes = disk.total_space();
            let free_bytes = disk.available_space();
            let used_bytes = total_bytes.saturating_sub(free_bytes);
            usage.insert(
                disk.mount_point().to_string_lossy().into_owned(),
                MountUsage { total_bytes, used_bytes, free_bytes, used_percent: if total_bytes > 0 { (used_bytes as f64 / total_bytes as f64 * 100.0) as f32 } else { 0.0 } },
            );
            let usage_counters = disk.usage();
            disk_read_bytes += usage_counters.total_read_bytes;
            disk_write_bytes += usage_counters.total_written_bytes;
        }

        let networks = Networks::new_with_refreshed_list();
        let (mut rx_bytes, mut tx_bytes, mut rx_packets, mut tx_packets) = (0u64, 0u64, 0u64, 0u64);
        for (_name, data) in networks.iter() {
            rx_bytes += data.total_received();
            tx_bytes += data.total_transmitted();
            rx_packets += data.total_packets_received();
            tx_packets += data.total_packets_transmitted();
        }

        // Rate fields require a prior reading over actual elapsed wall
        // time; the first sample after startup emits zeros (spec §4.3).
        let (rx_rate, tx_rate, disk_read_rate, disk_write_rate) = match &self.prior {
            Some(prior) => {
                let elapsed = now.duration_since(prior.at).as_secs_f64().max(0.001);
                let mib = 1024.0 * 1024.0;
                (
                    rx_bytes.saturating_sub(prior.rx_bytes) as f64 / elapsed / mib,
                    tx_bytes.saturating_sub(prior.tx_bytes) as f64 / elapsed / mib,
                    disk_read_bytes.saturating_sub(prior.disk_read_bytes) as f64 / elapsed / mib,
                    disk_write_bytes.saturating_sub(prior.disk_write_bytes) as f64 / elapsed / mib,
                )
            }
            None => (0.0, 0.0, 0.0, 0.0),
        };
        self.prior = Some(PriorReading { at: now, rx_bytes, tx_bytes, disk_read_bytes, disk_write_bytes });

        let mut processes: Vec<ProcessSample> = self
            .system
            .processes()
            .values()
            .map(|p| ProcessSample { pid: p.pid().as_u32(), name: p.name().to_string_lossy().into_owned(), memory_percent: if total > 0 { (p.memory() as f64 / total as f64 * 100.0) as f32 } else { 0.0 }, cpu_percent: p.cpu_usage() })
            .collect();
        let process_count = processes.len();
        processes.sort_by(|a, b| b.memory_percent.partial_cmp(&a.memory_percent).unwrap_or(std::cmp::Ordering::Equal));
        processes.truncate(self.config.top_n_processes);

        debug!(host_id = %self.config.host_id, process_count, "metric snapshot collected");

        MetricSnapshot {
            timestamp: Utc::now(),
            host_id: self.config.host_id.clone(),
            cpu,
            memory,
            disk: DiskStats { usage, read_mib_per_sec: disk_read_rate, write_mib_per_sec: disk_write_rate },
            network: NetworkStats { rx_mib_per_sec: rx_rate, tx_mib_per_sec: tx_rate, rx_bytes_total: rx_bytes, tx_bytes_total: tx_bytes, rx_packets_total: rx_packets, tx_packets_total: tx_packets, active_connections: 0 },
            processes: ProcessStats { count: process_count, top_by_memory: processes },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertEngine;
    use std::collections::HashMap as StdHashMap;

    #[tokio::test]
    async fn first_sample_after_startup_has_zero_rate_fields() {
        let spool = Arc::new(TelemetrySpool::open_in_memory(10).await.unwrap());
        let (live_tx, _live_rx) = broadcast::channel(8);
        let metrics = Arc::new(AgentMetrics::default());
        let alert_engine = Arc::new(AlertEngine::new(StdHashMap::new(), "http://localhost".to_string(), "agentd".to_string(), metrics.clone()));
        let mut sampler = MetricSampler::new(SamplerConfig { host_id: "host-1".to_string(), ..SamplerConfig::default() }, spool, live_tx, alert_engine, metrics);
        let snapshot = sampler.collect();
        assert_eq!(snapshot.network.rx_mib_per_sec, 0.0);
        assert_eq!(snapshot.disk.read_mib_per_sec, 0.0);
    }

    #[tokio::test]
    async fn second_sample_may_report_nonzero_rate() {
        let spool = Arc::new(TelemetrySpool::open_in_memory(10).await.unwrap());
        let (live_tx, _live_rx) = broadcast::channel(8);
        let metrics = Arc::new(AgentMetrics::default());
        let alert_engine = Arc::new(AlertEngine::new(StdHashMap::new(), "http://localhost".to_string(), "agentd".to_string(), metrics.clone()));
        let mut sampler = MetricSampler::new(SamplerConfig { host_id: "host-1".to_string(), ..SamplerConfig::default() }, spool, live_tx, alert_engine, metrics);
        let _first = sampler.collect();
        // Prior reading is now set; a second call should not panic and
        // should use the elapsed-time-based rate formula.
        let second = sampler.collect();
        assert!(second.network.rx_mib_per_sec >= 0.0);
    }

    #[tokio::test]
    async fn tick_increments_snapshots_spooled_on_successful_enqueue() {
        let spool = Arc::new(TelemetrySpool::open_in_memory(10).await.unwrap());
        let (live_tx, _live_rx) = broadcast::channel(8);
        let metrics = Arc::new(AgentMetrics::default());
        let alert_engine = Arc::new(AlertEngine::new(StdHashMap::new(), "http://localhost".to_string(), "agentd".to_string(), metrics.clone()));
        let mut sampler = MetricSampler::new(SamplerConfig { host_id: "host-1".to_string(), ..SamplerConfig::default() }, spool, live_tx, alert_engine, metrics.clone());

        sampler.tick().await;
        sampler.tick().await;

        assert_eq!(metrics.snapshot().snapshots_spooled, 2);
    }
}
