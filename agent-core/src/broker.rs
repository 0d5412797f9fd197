use std::sync::Arc;
use std::time::Duration;

use agent_model::prelude::ErrorEvent;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::warn;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connection unavailable: {0}")]
    ConnectionUnavailable(String),
    #[error("broker publish timed out")]
    Timeout,
    #[error("broker publish failed: {0}")]
    PublishFailed(String),
}

/// Wire body for a published error event (spec §6 "Outbound broker"):
/// `{timestamp, system_ip, log_path, log_label, application, log_line,
/// severity, priority}`. `ErrorEvent` already serializes to this shape.
#[derive(Debug, Serialize)]
struct BrokerMessage<'a> {
    #[serde(flatten)]
    event: &'a ErrorEvent,
}

/// Delivers Error Events to an external message broker (C3, spec §4.2).
/// Implementations MUST be safe for concurrent callers (multiple
/// Tailers).
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    async fn publish(&self, event: &ErrorEvent) -> Result<(), BrokerError>;
}

/// One shared, lazily-(re)connecting NATS connection pooled behind the
/// publisher (spec §4.2 "implementers SHOULD pool connections"). The
/// connection is established on first publish rather than at
/// construction so a broker that is briefly unavailable at startup does
/// not prevent the Supervisor from finishing its boot sequence.
pub struct NatsBrokerPublisher {
    url: String,
    subject: String,
    connection: Mutex<Option<async_nats::Client>>,
}

impl NatsBrokerPublisher {
    pub fn new(url: impl Into<String>, subject: impl Into<String>) -> Self {
        Self { url: url.into(), subject: subject.into(), connection: Mutex::new(None) }
    }

    async fn connection(&self) -> Result<async_nats::Client, BrokerError> {
        let mut guard = self.connection.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = async_nats::connect(&self.url).await.map_err(|e| BrokerError::ConnectionUnavailable(e.to_string()))?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

#[async_trait]
impl BrokerPublisher for NatsBrokerPublisher {
    async fn publish(&self, event: &ErrorEvent) -> Result<(), BrokerError> {
        let payload = serde_json::to_vec(&BrokerMessage { event }).map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
        let client = self.connection().await?;
        let subject = self.subject.clone();

        let attempt = async {
            client.publish(subject, payload.into()).await.map_err(|e| BrokerError::PublishFailed(e.to_string()))?;
            client.flush().await.map_err(|e| BrokerError::PublishFailed(e.to_string()))
        };

        match tokio::time::timeout(PUBLISH_TIMEOUT, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                // A failed publish invalidates the cached connection so the
                // next attempt reconnects instead of reusing a dead one.
                *self.connection.lock().await = None;
                Err(e)
            }
            Err(_) => {
                *self.connection.lock().await = None;
                Err(BrokerError::Timeout)
            }
        }
    }
}

/// Test/fallback publisher that always reports failure without touching
/// the network; used when no broker URL is configured.
#[derive(Debug, Default)]
pub struct NullBrokerPublisher;

#[async_trait]
impl BrokerPublisher for NullBrokerPublisher {
    async fn publish(&self, _event: &ErrorEvent) -> Result<(), BrokerError> {
        warn!("no broker configured, dropping error event");
        Err(BrokerError::ConnectionUnavailable("no broker url configured".to_string()))
    }
}

pub fn shared(publisher: impl BrokerPublisher + 'static) -> Arc<dyn BrokerPublisher> {
    Arc::new(publisher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_model::prelude::{Priority, Severity};

    fn sample_event() -> ErrorEvent {
        ErrorEvent {
            timestamp: chrono::Utc::now(),
            host_id: "host-1".into(),
            log_path: "/var/log/app.log".into(),
            log_label: "app.log".into(),
            application: "agentd".into(),
            log_line: "ERROR: boom".into(),
            severity: Severity::Error,
            priority: Priority::High,
        }
    }

    #[tokio::test]
    async fn null_publisher_always_reports_failure() {
        let publisher = NullBrokerPublisher;
        assert!(publisher.publish(&sample_event()).await.is_err());
    }
}
