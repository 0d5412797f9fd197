pub mod env_config;
pub mod file_config;

pub use env_config::EnvConfig;
pub use file_config::{FileConfig, FileConfigAlertRule, FileConfigEntry};
