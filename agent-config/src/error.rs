#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: String, #[source] source: std::io::Error },

    #[error("failed to parse TOML config {path}: {source}")]
    ParseToml { path: String, #[source] source: toml::de::Error },

    #[error("failed to parse secrets file {path}: {source}")]
    ParseSecrets { path: String, #[source] source: serde_json::Error },

    #[error("backend config fetch failed: {0}")]
    BackendUnreachable(String),

    #[error("durable cache read failed: {0}")]
    CacheRead(String),

    #[error("durable cache write failed: {0}")]
    CacheWrite(String),

    #[error("invalid override for '{path}': {reason}")]
    InvalidOverride { path: String, reason: String },

    #[error("unknown config path: {0}")]
    UnknownPath(String),

    #[error("tailer concurrency limit exceeded: {requested} enabled files exceeds max_tailers = {max}")]
    TooManyTailers { requested: usize, max: usize },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
