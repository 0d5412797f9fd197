//! Layered configuration store for the monitoring agent (four-layer
//! precedence: hardcoded defaults, local file, backend fetch, runtime
//! overrides), addressed by an atomically-swapped snapshot.

pub mod backend;
pub mod defaults;
pub mod durable_cache;
pub mod error;
pub mod loader;
pub mod node_id;
pub mod overrides;
pub mod schema;
pub mod secrets;
pub mod snapshot;
pub mod sources;
pub mod store;

pub use error::{ConfigError, ConfigResult};
pub use snapshot::{ConfigSnapshot, HotConfig, StaticConfig};
pub use store::{ConfigPaths, ConfigStore};
