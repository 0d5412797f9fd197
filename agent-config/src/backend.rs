use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};
use crate::sources::file_config::FileConfig;

const BACKEND_CONFIG_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct BackendConfigResponse {
    success: bool,
    #[serde(default)]
    config: Option<FileConfig>,
}

/// Fetches the per-node configuration layer from the central backend
/// (spec §4.8 layer 3, §6 "Outbound config fetch":
/// `GET …/settings/daemon/{node_id} → {success, config:{…}}`).
#[derive(Debug, Clone)]
pub struct BackendConfigClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendConfigClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder().timeout(BACKEND_CONFIG_FETCH_TIMEOUT).build().unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
        }
    }

    pub async fn fetch(&self, node_id: &str) -> ConfigResult<FileConfig> {
        let url = format!("{}/settings/daemon/{}", self.base_url.trim_end_matches('/'), node_id);
        let response = self.http.get(&url).send().await.map_err(|e| ConfigError::BackendUnreachable(e.to_string()))?;
        let body: BackendConfigResponse = response.json().await.map_err(|e| ConfigError::BackendUnreachable(e.to_string()))?;
        if !body.success {
            return Err(ConfigError::BackendUnreachable("backend reported success=false".to_string()));
        }
        Ok(body.config.unwrap_or_default())
    }
}
