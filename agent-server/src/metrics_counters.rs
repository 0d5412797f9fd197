use std::sync::Arc;

use agent_model::prelude::ErrorEvent;
use agent_core::broker::{BrokerError, BrokerPublisher};
pub use agent_core::metrics::{AgentMetrics, AgentMetricsSnapshot};
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Wraps the real [`BrokerPublisher`] so every outbound Error Event also
/// feeds the Live Log Broadcaster and the `/api/metrics` counters, without
/// touching the Tailer's own narrow `Arc<dyn BrokerPublisher>` seam.
pub struct BroadcastingBrokerPublisher {
    inner: Arc<dyn BrokerPublisher>,
    live_tx: broadcast::Sender<ErrorEvent>,
    metrics: Arc<AgentMetrics>,
}

impl BroadcastingBrokerPublisher {
    pub fn new(inner: Arc<dyn BrokerPublisher>, live_tx: broadcast::Sender<ErrorEvent>, metrics: Arc<AgentMetrics>) -> Self {
        Self { inner, live_tx, metrics }
    }
}

#[async_trait]
impl BrokerPublisher for BroadcastingBrokerPublisher {
    async fn publish(&self, event: &ErrorEvent) -> Result<(), BrokerError> {
        // Live subscribers see the event whether or not the broker publish
        // itself succeeds; that stream mirrors what tailers observed, not
        // what made it to the broker.
        let _ = self.live_tx.send(event.clone());
        let result = self.inner.publish(event).await;
        if result.is_ok() {
            self.metrics.record_event_published();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::broker::NullBrokerPublisher;
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
    async fn failed_publish_does_not_increment_events_published() {
        let (live_tx, mut live_rx) = broadcast::channel(8);
        let metrics = Arc::new(AgentMetrics::default());
        let publisher = BroadcastingBrokerPublisher::new(Arc::new(NullBrokerPublisher), live_tx, metrics.clone());

        let result = publisher.publish(&sample_event()).await;

        assert!(result.is_err());
        assert_eq!(metrics.snapshot().events_published, 0);
        assert!(live_rx.try_recv().is_ok());
    }
}
