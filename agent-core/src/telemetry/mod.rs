//! Durable spool (C4) and HTTP publisher (C5) for Metric Snapshots
//! (spec §4.4, §4.5).

pub mod publisher;
pub mod spool;

pub use publisher::{TelemetryPublisher, TelemetryPublisherConfig};
pub use spool::{SpoolError, TelemetrySpool};
