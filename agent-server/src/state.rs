use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use agent_config::ConfigStore;
use agent_core::alert::AlertEngine;
use agent_core::suppression::SuppressionCache;
use agent_core::telemetry::TelemetrySpool;
use agent_model::prelude::{ErrorEvent, MetricSnapshot};
use tokio::sync::broadcast;

use crate::metrics_counters::AgentMetrics;
use crate::processes::ProcessRegistry;

/// Enable/disable flags for the two Live Broadcasters, flipped by
/// `POST /api/control` (spec §6: `start_livelogs|stop_livelogs|
/// start_telemetry|stop_telemetry`). A disabled broadcaster keeps existing
/// WebSocket connections open but stops forwarding frames to them, so
/// re-enabling resumes the stream without clients having to reconnect.
#[derive(Debug)]
pub struct BroadcasterControl {
    live_logs_enabled: AtomicBool,
    live_metrics_enabled: AtomicBool,
}

impl Default for BroadcasterControl {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcasterControl {
    pub fn new() -> Self {
        Self { live_logs_enabled: AtomicBool::new(true), live_metrics_enabled: AtomicBool::new(true) }
    }

    pub fn live_logs_enabled(&self) -> bool {
        self.live_logs_enabled.load(Ordering::Relaxed)
    }

    pub fn live_metrics_enabled(&self) -> bool {
        self.live_metrics_enabled.load(Ordering::Relaxed)
    }

    pub fn set_live_logs(&self, enabled: bool) {
        self.live_logs_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_live_metrics(&self, enabled: bool) {
        self.live_metrics_enabled.store(enabled, Ordering::Relaxed);
    }
}

/// Shared application state handed to every Control API handler and
/// WebSocket upgrade (modeled on the teacher's `AppState`, which bundles an
/// `Arc<T>` per subsystem behind a cheaply `Clone`-able struct).
#[derive(Clone)]
pub struct AppState {
    pub node_id: String,
    pub version: &'static str,
    pub started_at: Instant,
    pub config: Arc<ConfigStore>,
    pub spool: Arc<TelemetrySpool>,
    pub suppression: Arc<SuppressionCache>,
    pub alert_engine: Arc<AlertEngine>,
    pub processes: Arc<ProcessRegistry>,
    pub live_logs_tx: broadcast::Sender<ErrorEvent>,
    pub live_metrics_tx: broadcast::Sender<MetricSnapshot>,
    pub broadcaster_control: Arc<BroadcasterControl>,
    pub metrics: Arc<AgentMetrics>,
}

impl AppState {
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
