//! Periodic liveness ping to the backend (spec §4.11, §6 "Outbound
//! heartbeat"). Failure is logged but non-fatal: the next tick tries again.

use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct HeartbeatPayload<'a> {
    node_id: &'a str,
    status: &'a str,
    timestamp: chrono::DateTime<Utc>,
}

/// Emits `POST {node_id, status, timestamp}` to `heartbeat_url` every
/// `interval` until cancelled. A blank `heartbeat_url` disables the
/// worker rather than erroring at every tick.
pub struct Heartbeat {
    http: Client,
    heartbeat_url: String,
    node_id: String,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(heartbeat_url: String, node_id: String, interval: Duration, request_timeout: Duration) -> Self {
        let http = Client::builder().timeout(request_timeout).build().unwrap_or_else(|_| Client::new());
        Self { http, heartbeat_url, node_id, interval }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        if self.heartbeat_url.is_empty() {
            debug!("no heartbeat_url configured, heartbeat worker idle");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.beat().await;
                }
            }
        }
    }

    async fn beat(&self) {
        let payload = HeartbeatPayload { node_id: &self.node_id, status: "ok", timestamp: Utc::now() };
        if let Err(e) = self.http.post(&self.heartbeat_url).json(&payload).send().await.and_then(|r| r.error_for_status()) {
            warn!(error = %e, "heartbeat POST failed, will retry next tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_url_returns_immediately() {
        let heartbeat = Heartbeat::new(String::new(), "node-1".to_string(), Duration::from_secs(30), Duration::from_secs(10));
        let cancel = CancellationToken::new();
        // Should return without blocking on the (never-firing) ticker.
        tokio::time::timeout(Duration::from_millis(100), heartbeat.run(cancel)).await.unwrap();
    }
}
