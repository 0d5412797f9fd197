//! Hardcoded defaults, the lowest-precedence config layer (spec §4.8).

pub const CONTROL_API_PORT: u16 = 8754;
pub const LIVE_LOGS_PORT: u16 = 8755;
pub const LIVE_METRICS_PORT: u16 = 8756;

pub const LOG_LEVEL: &str = "info";

pub const SAMPLER_INTERVAL_SECS: u64 = 3;
pub const SAMPLER_STARTUP_JITTER_MAX_SECS: u64 = 10;
pub const PUBLISHER_INTERVAL_SECS: u64 = 60;
pub const PUBLISHER_BATCH_SIZE: usize = 10;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub const SPOOL_MAX_SIZE: u64 = 1000;

pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const RETRY_BACKOFF_SECS: [u64; 3] = [5, 15, 60];
pub const PUBLISH_MAX_RETRIES: u32 = 3;

pub const MAX_TAILERS: usize = 100;
pub const TAILER_FILE_POLL_INTERVAL_SECS: u64 = 5;
pub const TAILER_READ_POLL_INTERVAL_MS: u64 = 1000;
pub const TAILER_ROTATION_POLL_INTERVAL_SECS: u64 = 30;

pub const SUPPRESSION_TTL_SECS: u64 = 60;

pub const GRACEFUL_SHUTDOWN_WINDOW_SECS: u64 = 10;

pub const KEYWORDS: &[&str] = &["error", "warn", "fail"];

pub const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["/etc/agentd/config.toml", "./agentd.toml"];
