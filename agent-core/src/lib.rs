//! Tailer, suppression cache, broker publisher, telemetry spool/publisher,
//! metric sampler, and alert engine for the host monitoring agent.
//!
//! Nothing in this crate binds a network listener or parses CLI args; that
//! belongs to `agent-server`. Each component here owns one cooperative task
//! loop and is driven by a `tokio_util::sync::CancellationToken`.

pub mod alert;
pub mod broker;
pub mod classify;
pub mod keywords;
pub mod metrics;
pub mod sampler;
pub mod suppression;
pub mod tailer;
pub mod telemetry;

pub mod prelude {
    pub use crate::alert::AlertEngine;
    pub use crate::broker::{BrokerError, BrokerPublisher, NatsBrokerPublisher, NullBrokerPublisher};
    pub use crate::keywords::KeywordMatcher;
    pub use crate::metrics::{AgentMetrics, AgentMetricsSnapshot};
    pub use crate::sampler::{MetricSampler, SamplerConfig};
    pub use crate::suppression::{PostgresRulesStore, RulesStore, SuppressionCache, SuppressionError};
    pub use crate::tailer::{Tailer, TailerIntervals};
    pub use crate::telemetry::{SpoolError, TelemetryPublisher, TelemetryPublisherConfig, TelemetrySpool};
}
