/// Environment-variable overlay, gathered once at startup (spec §4.8,
/// §6 "Environment / configuration knobs"). Every field mirrors
/// [`super::file_config::FileConfig`] so the merge in
/// [`crate::loader::ConfigLoader`] can treat both layers uniformly.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub node_id: Option<String>,
    pub control_api_port: Option<u16>,
    pub live_logs_port: Option<u16>,
    pub live_metrics_port: Option<u16>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub broker_url: Option<String>,
    pub backend_url: Option<String>,
    pub alert_ticket_url: Option<String>,
    pub heartbeat_url: Option<String>,
    pub backend_auth_token: Option<String>,
    pub spool_path: Option<String>,
    pub spool_max_size: Option<u64>,
    pub sampler_interval_secs: Option<u64>,
    pub publisher_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub http_request_timeout_secs: Option<u64>,
    pub keywords: Option<Vec<String>>,
    pub max_tailers: Option<usize>,
    pub suppression_rules_store_url: Option<String>,
    pub suppression_ttl_secs: Option<u64>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            node_id: env_var("AGENTD_NODE_ID"),
            control_api_port: parse_env("AGENTD_CONTROL_API_PORT"),
            live_logs_port: parse_env("AGENTD_LIVE_LOGS_PORT"),
            live_metrics_port: parse_env("AGENTD_LIVE_METRICS_PORT"),
            log_level: env_var("AGENTD_LOG_LEVEL"),
            log_file: env_var("AGENTD_LOG_FILE"),
            broker_url: env_var("AGENTD_BROKER_URL"),
            backend_url: env_var("AGENTD_BACKEND_URL"),
            alert_ticket_url: env_var("AGENTD_ALERT_TICKET_URL"),
            heartbeat_url: env_var("AGENTD_HEARTBEAT_URL"),
            backend_auth_token: env_var("AGENTD_BACKEND_AUTH_TOKEN"),
            spool_path: env_var("AGENTD_SPOOL_PATH"),
            spool_max_size: parse_env("AGENTD_SPOOL_MAX_SIZE"),
            sampler_interval_secs: parse_env("AGENTD_SAMPLER_INTERVAL_SECS"),
            publisher_interval_secs: parse_env("AGENTD_PUBLISHER_INTERVAL_SECS"),
            heartbeat_interval_secs: parse_env("AGENTD_HEARTBEAT_INTERVAL_SECS"),
            http_request_timeout_secs: parse_env("AGENTD_HTTP_REQUEST_TIMEOUT_SECS"),
            keywords: parse_csv_var("AGENTD_KEYWORDS"),
            max_tailers: parse_env("AGENTD_MAX_TAILERS"),
            suppression_rules_store_url: env_var("AGENTD_SUPPRESSION_RULES_STORE_URL"),
            suppression_ttl_secs: parse_env("AGENTD_SUPPRESSION_TTL_SECS"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_var(name).and_then(|v| v.parse().ok())
}

fn parse_csv_var(name: &str) -> Option<Vec<String>> {
    env_var(name).map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_csv_var_splits_and_trims() {
        // SAFETY: test-local, single-threaded env mutation.
        unsafe { std::env::set_var("AGENTD_TEST_CSV", "a, b ,c") };
        assert_eq!(parse_csv_var("AGENTD_TEST_CSV"), Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
        unsafe { std::env::remove_var("AGENTD_TEST_CSV") };
    }

    #[test]
    fn missing_var_is_none() {
        unsafe { std::env::remove_var("AGENTD_DOES_NOT_EXIST") };
        assert_eq!(env_var("AGENTD_DOES_NOT_EXIST"), None);
    }
}
