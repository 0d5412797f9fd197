//! Thin HTTP client over the Control API (spec §6). Mirrors the shape of
//! [`agent_server::errors::AppError`]'s JSON body without depending on the
//! `agent-server` crate: `agentctl` talks to the daemon only over the wire.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, serde::Deserialize)]
struct ErrorDetail {
    message: String,
    status: u16,
}

pub struct ControlApiClient {
    http: Client,
    base_url: String,
}

impl ControlApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build().context("failed to build HTTP client")?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.get(&url).send().await.with_context(|| format!("request to {url} failed"))?;
        Self::decode(response, &url).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).json(body).send().await.with_context(|| format!("request to {url} failed"))?;
        Self::decode(response, &url).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.post(path, &Value::Null).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.put(&url).json(body).send().await.with_context(|| format!("request to {url} failed"))?;
        Self::decode(response, &url).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.delete(&url).send().await.with_context(|| format!("request to {url} failed"))?;
        Self::decode(response, &url).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let status = response.status();
        let bytes = response.bytes().await.with_context(|| format!("failed to read response body from {url}"))?;
        if status.is_success() {
            return serde_json::from_slice(&bytes).with_context(|| format!("failed to decode response from {url}"));
        }
        if let Ok(body) = serde_json::from_slice::<ErrorBody>(&bytes) {
            bail!("{} ({})", body.error.message, body.error.status);
        }
        bail!("request to {url} failed with status {status}");
    }
}
