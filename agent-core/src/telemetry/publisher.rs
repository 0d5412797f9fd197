use std::time::{Duration, Instant};

use agent_model::prelude::MetricSnapshot;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::spool::TelemetrySpool;

#[derive(Debug, Clone)]
pub struct TelemetryPublisherConfig {
    pub endpoint_url: String,
    pub auth_token: Option<String>,
    pub interval: Duration,
    pub batch_size: i64,
    pub backoff: Vec<Duration>,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl TelemetryPublisherConfig {
    pub fn from_defaults(endpoint_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            auth_token,
            interval: Duration::from_secs(agent_config::defaults::PUBLISHER_INTERVAL_SECS),
            batch_size: agent_config::defaults::PUBLISHER_BATCH_SIZE as i64,
            backoff: agent_config::defaults::RETRY_BACKOFF_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
            max_retries: agent_config::defaults::PUBLISH_MAX_RETRIES,
            request_timeout: Duration::from_secs(agent_config::defaults::HTTP_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Outbound telemetry POST body (spec §6 "Outbound telemetry endpoint").
#[derive(Debug, Serialize)]
struct TelemetryPayload {
    node_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    cpu_percent: f32,
    memory_percent: f32,
    memory_used_mb: f64,
    memory_total_mb: f64,
    disk_percent: f32,
    disk_used_gb: f64,
    disk_total_gb: f64,
    network_rx_bytes: u64,
    network_tx_bytes: u64,
    network_rx_rate_mbps: f64,
    network_tx_rate_mbps: f64,
    uptime_seconds: u64,
    process_count: usize,
    active_connections: u32,
    load_avg_1m: f64,
    load_avg_5m: f64,
    load_avg_15m: f64,
}

fn to_payload(node_id: &str, snapshot: &MetricSnapshot, uptime_seconds: u64) -> TelemetryPayload {
    let (disk_total, disk_used): (u64, u64) = snapshot.disk.usage.values().fold((0, 0), |(t, u), mount| (t + mount.total_bytes, u + mount.used_bytes));
    let disk_percent = if disk_total > 0 { (disk_used as f64 / disk_total as f64 * 100.0) as f32 } else { 0.0 };

    TelemetryPayload {
        node_id: node_id.to_string(),
        timestamp: snapshot.timestamp,
        cpu_percent: snapshot.cpu.overall_percent,
        memory_percent: snapshot.memory.used_percent,
        memory_used_mb: snapshot.memory.used_bytes as f64 / (1024.0 * 1024.0),
        memory_total_mb: snapshot.memory.total_bytes as f64 / (1024.0 * 1024.0),
        disk_percent,
        disk_used_gb: disk_used as f64 / (1024.0 * 1024.0 * 1024.0),
        disk_total_gb: disk_total as f64 / (1024.0 * 1024.0 * 1024.0),
        network_rx_bytes: snapshot.network.rx_bytes_total,
        network_tx_bytes: snapshot.network.tx_bytes_total,
        network_rx_rate_mbps: snapshot.network.rx_mib_per_sec,
        network_tx_rate_mbps: snapshot.network.tx_mib_per_sec,
        uptime_seconds,
        process_count: snapshot.processes.count,
        active_connections: snapshot.network.active_connections,
        load_avg_1m: snapshot.cpu.load_avg_1m,
        load_avg_5m: snapshot.cpu.load_avg_5m,
        load_avg_15m: snapshot.cpu.load_avg_15m,
    }
}

/// HTTP POST publisher for the telemetry spool (C5, spec §4.5). A single
/// pooled `reqwest::Client` (≤5 idle connections to the backend host) is
/// reused across ticks.
pub struct TelemetryPublisher {
    http: Client,
    spool: std::sync::Arc<TelemetrySpool>,
    config: TelemetryPublisherConfig,
    node_id: String,
    started_at: Instant,
}

impl TelemetryPublisher {
    pub fn new(spool: std::sync::Arc<TelemetrySpool>, config: TelemetryPublisherConfig, node_id: String) -> Self {
        let http = Client::builder().timeout(config.request_timeout).pool_max_idle_per_host(5).build().unwrap_or_else(|_| Client::new());
        Self { http, spool, config, node_id, started_at: Instant::now() }
    }

    /// Runs the publish loop every `interval` seconds until `cancel`
    /// fires (spec §4.5 "Loop").
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.publish_batch().await {
                        error!(error = %e, "telemetry publish batch failed");
                    }
                }
            }
        }
    }

    async fn publish_batch(&self) -> Result<(), super::spool::SpoolError> {
        let entries = self.spool.dequeue(self.config.batch_size).await?;
        let uptime_seconds = self.started_at.elapsed().as_secs();

        for entry in entries {
            let payload = to_payload(&self.node_id, &entry.snapshot, uptime_seconds);
            match self.post_with_backoff(&payload).await {
                PostOutcome::Sent => {
                    self.spool.mark_sent(entry.id).await?;
                }
                PostOutcome::Unrecoverable(status) => {
                    error!(id = entry.id, status = %status, "telemetry entry rejected by backend, discarding");
                    self.spool.mark_sent(entry.id).await?;
                }
                PostOutcome::ExhaustedRetries => {
                    let still_queued = self.spool.mark_failed(entry.id, self.config.max_retries).await?;
                    if !still_queued {
                        warn!(id = entry.id, "telemetry entry dropped after exhausting retries");
                    }
                }
            }
        }
        Ok(())
    }

    /// Single POST attempt, retried through the configured backoff vector
    /// on 5xx/timeout/connection/DNS failure (spec §4.5).
    async fn post_with_backoff(&self, payload: &TelemetryPayload) -> PostOutcome {
        let mut attempt = 0usize;
        loop {
            let mut request = self.http.post(&self.config.endpoint_url).json(payload);
            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return PostOutcome::Sent,
                Ok(response) if response.status().is_client_error() => return PostOutcome::Unrecoverable(response.status()),
                Ok(response) => {
                    warn!(status = %response.status(), attempt, "telemetry POST failed with server error");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "telemetry POST failed (network/timeout/DNS)");
                }
            }

            match self.config.backoff.get(attempt) {
                Some(delay) => {
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
                None => return PostOutcome::ExhaustedRetries,
            }
        }
    }
}

enum PostOutcome {
    Sent,
    Unrecoverable(StatusCode),
    ExhaustedRetries,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::{CpuStats, DiskStats, MemoryStats, MountUsage, NetworkStats, ProcessStats};

    #[test]
    fn disk_percent_is_derived_from_aggregate_usage() {
        let mut disk = DiskStats::default();
        disk.usage.insert("/".to_string(), MountUsage { total_bytes: 1000, used_bytes: 500, free_bytes: 500, used_percent: 50.0 });
        let snapshot = MetricSnapshot {
            timestamp: chrono::Utc::now(),
            host_id: "host-1".into(),
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            disk,
            network: NetworkStats::default(),
            processes: ProcessStats::default(),
        };
        let payload = to_payload("host-1", &snapshot, 42);
        assert_eq!(payload.disk_percent, 50.0);
        assert_eq!(payload.uptime_seconds, 42);
    }
}
