use std::collections::HashMap;

use agent_model::prelude::{AlertRule, MonitoredFileSpec};

/// Fields that require a process restart to take effect (spec §4.8:
/// "listening ports and broker URL"). Kept in a distinct struct from
/// [`HotConfig`] so hot-reload code cannot accidentally mutate them.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticConfig {
    pub node_id: String,
    pub control_api_port: u16,
    pub live_logs_port: u16,
    pub live_metrics_port: u16,
    pub broker_url: String,
    pub backend_url: String,
    pub alert_ticket_url: String,
    pub heartbeat_url: String,
    pub backend_auth_token: Option<String>,
    pub spool_path: String,
    pub suppression_rules_store_url: String,
    pub log_file: Option<String>,
    pub sampler_interval_secs: u64,
    pub publisher_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub http_request_timeout_secs: u64,
    pub retry_backoff_secs: Vec<u64>,
    pub spool_max_size: u64,
}

/// Fields that hot-reload atomically without a restart (spec §4.8): alert
/// thresholds, the error-keyword set, log level, and the monitored-file
/// list.
#[derive(Debug, Clone, PartialEq)]
pub struct HotConfig {
    pub log_level: String,
    pub keywords: Vec<String>,
    pub max_tailers: usize,
    pub suppression_ttl_secs: u64,
    pub monitored_files: Vec<MonitoredFileSpec>,
    pub alert_rules: HashMap<String, AlertRule>,
}

/// The effective configuration after merge (spec §3 "Config Snapshot").
/// Retrievable atomically as a whole via [`crate::store::ConfigStore::snapshot`]
/// and by dotted path via [`crate::store::ConfigStore::get_path`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    pub version: u64,
    pub static_config: StaticConfig,
    pub hot: HotConfig,
}

impl ConfigSnapshot {
    /// `true` when the number of enabled monitored files would exceed the
    /// configured hard ceiling (spec §9 open question, resolved as
    /// REQUIRED, default 100).
    pub fn exceeds_tailer_limit(&self) -> bool {
        self.enabled_file_count() > self.hot.max_tailers
    }

    pub fn enabled_file_count(&self) -> usize {
        self.hot.monitored_files.iter().filter(|f| f.enabled).count()
    }
}
