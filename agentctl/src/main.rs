//! `agentctl`: command-line client for `agentd`'s local control API.
//!
//! Every subcommand is a thin wrapper over one control API route (see
//! `agent-server::control_api::router`); this binary owns no state of its
//! own beyond the base URL and request timeout.

mod client;

use std::collections::HashMap;
use std::time::Duration;

use agent_model::prelude::{ConfigValue, Priority};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use crate::client::ControlApiClient;

#[derive(Parser, Debug)]
#[command(name = "agentctl")]
#[command(about = "Inspect and control a running agentd instance over its local control API")]
struct Cli {
    /// Base URL of the control API, e.g. http://127.0.0.1:8754.
    #[arg(long, env = "AGENTCTL_BASE_URL", default_value = "http://127.0.0.1:8754", global = true)]
    base_url: String,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 10, global = true)]
    timeout_secs: u64,

    /// Print raw JSON instead of a formatted summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report liveness and per-component status.
    Health,
    /// Report node id, config version, monitored files, and spool/broadcaster state.
    Status,
    /// Report internal counters (events published, publish failures, etc).
    Metrics,
    /// Start or stop a live broadcaster.
    Control {
        #[command(subcommand)]
        action: ControlAction,
    },
    /// Inspect or manage host processes.
    Processes {
        #[command(subcommand)]
        action: ProcessAction,
    },
    /// Read or modify the running configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List or edit monitored log files.
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
}

#[derive(Subcommand, Debug)]
enum ControlAction {
    StartLivelogs,
    StopLivelogs,
    StartTelemetry,
    StopTelemetry,
}

#[derive(Subcommand, Debug)]
enum ProcessAction {
    /// List processes, sorted by cpu or memory.
    List {
        #[arg(long, default_value = "cpu")]
        sort_by: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a single process's detail.
    Show { pid: u32 },
    /// Send a kill signal to a process.
    Kill {
        pid: u32,
        /// Use SIGKILL instead of SIGTERM.
        #[arg(long)]
        force: bool,
    },
    /// Show recent CPU/memory history for a process.
    History {
        pid: u32,
        #[arg(long, default_value_t = 1)]
        hours: u64,
    },
    /// Show a process and its descendants.
    Tree { pid: u32 },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the full static+hot config snapshot.
    Get,
    /// Apply a single `path=value` runtime override (spec §4.8's schema-validated path).
    Set {
        /// Dotted config path, e.g. `hot.log_level`.
        path: String,
        /// New value, parsed as JSON if possible, otherwise taken as a string.
        value: String,
    },
    /// Refetch the backend-supplied config layer.
    Reload,
    /// List every overridable config path and whether it hot-reloads.
    Schema,
}

#[derive(Subcommand, Debug)]
enum FilesAction {
    /// List monitored files.
    List,
    /// Add a new monitored file.
    Add {
        path: std::path::PathBuf,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Replace an existing monitored file's definition.
    Replace {
        id: String,
        path: std::path::PathBuf,
        #[arg(long)]
        label: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a monitored file by id.
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))).with_writer(std::io::stderr).init();

    let client = ControlApiClient::new(cli.base_url, Duration::from_secs(cli.timeout_secs))?;
    let output = run(&client, cli.command).await?;
    print_output(&output, cli.json);
    Ok(())
}

async fn run(client: &ControlApiClient, command: Command) -> Result<Value> {
    match command {
        Command::Health => client.get("/api/health").await,
        Command::Status => client.get("/api/status").await,
        Command::Metrics => client.get("/api/metrics").await,
        Command::Control { action } => {
            let body = json!({ "command": control_action_tag(&action) });
            client.post("/api/control", &body).await
        }
        Command::Processes { action } => run_processes(client, action).await,
        Command::Config { action } => run_config(client, action).await,
        Command::Files { action } => run_files(client, action).await,
    }
}

fn control_action_tag(action: &ControlAction) -> &'static str {
    match action {
        ControlAction::StartLivelogs => "start_livelogs",
        ControlAction::StopLivelogs => "stop_livelogs",
        ControlAction::StartTelemetry => "start_telemetry",
        ControlAction::StopTelemetry => "stop_telemetry",
    }
}

async fn run_processes(client: &ControlApiClient, action: ProcessAction) -> Result<Value> {
    match action {
        ProcessAction::List { sort_by, limit } => client.get(&format!("/api/processes?sortBy={sort_by}&limit={limit}")).await,
        ProcessAction::Show { pid } => client.get(&format!("/api/processes/{pid}")).await,
        ProcessAction::Kill { pid, force } => client.post(&format!("/api/processes/{pid}/kill"), &json!({ "force": force })).await,
        ProcessAction::History { pid, hours } => client.get(&format!("/api/processes/{pid}/history?hours={hours}")).await,
        ProcessAction::Tree { pid } => client.get(&format!("/api/processes/{pid}/tree")).await,
    }
}

async fn run_config(client: &ControlApiClient, action: ConfigAction) -> Result<Value> {
    match action {
        ConfigAction::Get => client.get("/api/config").await,
        ConfigAction::Set { path, value } => {
            let parsed: Value = serde_json::from_str(&value).unwrap_or(Value::String(value.clone()));
            let config_value = json_to_config_value(parsed).with_context(|| format!("unsupported value for {path}"))?;
            let mut settings = HashMap::new();
            settings.insert(path, config_value);
            client.post("/api/config", &json!({ "settings": settings })).await
        }
        ConfigAction::Reload => client.post_empty("/api/config/reload").await,
        ConfigAction::Schema => client.get("/api/config/schema").await,
    }
}

/// Maps a parsed JSON value onto [`ConfigValue`]'s closed variant set; the
/// schema endpoint (`/api/config/schema`) is the authority on which paths
/// accept which variant, so this is a syntactic mapping only.
fn json_to_config_value(value: Value) -> Result<ConfigValue> {
    match value {
        Value::String(s) => Ok(ConfigValue::String(s)),
        Value::Bool(b) => Ok(ConfigValue::Bool(b)),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(ConfigValue::Integer(n.as_i64().context("integer out of range")?)),
        Value::Number(n) => Ok(ConfigValue::Float(n.as_f64().context("not a finite number")?)),
        Value::Array(items) => {
            let strings = items.into_iter().map(|v| match v {
                Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            }).collect::<Result<Vec<String>>>()?;
            Ok(ConfigValue::StringList(strings))
        }
        other => anyhow::bail!("cannot convert {other} into a config value"),
    }
}

async fn run_files(client: &ControlApiClient, action: FilesAction) -> Result<Value> {
    match action {
        FilesAction::List => client.get("/api/monitored-files").await,
        FilesAction::Add { path, label, priority, disabled } => {
            let body = monitored_file_body(None, path, label, &priority, disabled)?;
            client.post("/api/monitored-files", &body).await
        }
        FilesAction::Replace { id, path, label, priority, disabled } => {
            let body = monitored_file_body(Some(id.clone()), path, label, &priority, disabled)?;
            client.put(&format!("/api/monitored-files/{id}"), &body).await
        }
        FilesAction::Remove { id } => client.delete(&format!("/api/monitored-files/{id}")).await,
    }
}

fn monitored_file_body(id: Option<String>, path: std::path::PathBuf, label: Option<String>, priority: &str, disabled: bool) -> Result<Value> {
    let priority: Priority = priority.parse().map_err(|_| anyhow::anyhow!("priority must be one of low, medium, high, critical"))?;
    Ok(json!({
        "id": id,
        "path": path,
        "label": label,
        "priority": priority,
        "enabled": !disabled,
    }))
}

fn print_output(value: &Value, raw_json: bool) {
    if raw_json {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
        return;
    }
    match serde_yaml_like(value) {
        Some(rendered) => println!("{rendered}"),
        None => println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())),
    }
}

/// Renders a JSON value as indented `key: value` lines for terminal
/// readability; falls back to pretty JSON for anything that isn't an
/// object or array of objects (handled by the caller).
fn serde_yaml_like(value: &Value) -> Option<String> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(serde_json::to_string_pretty(value).ok()?),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_to_config_value_maps_scalars() {
        assert!(matches!(json_to_config_value(Value::Bool(true)).unwrap(), ConfigValue::Bool(true)));
        assert!(matches!(json_to_config_value(json!(5)).unwrap(), ConfigValue::Integer(5)));
        assert!(matches!(json_to_config_value(json!("info")).unwrap(), ConfigValue::String(s) if s == "info"));
    }

    #[test]
    fn json_to_config_value_rejects_null() {
        assert!(json_to_config_value(Value::Null).is_err());
    }

    #[test]
    fn control_action_tags_match_wire_contract() {
        assert_eq!(control_action_tag(&ControlAction::StartLivelogs), "start_livelogs");
        assert_eq!(control_action_tag(&ControlAction::StopTelemetry), "stop_telemetry");
    }
}
