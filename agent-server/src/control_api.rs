//! Local control API (C11, spec §6): status, process inspection, config
//! read/write, and monitored-file CRUD. Route composition follows the
//! teacher's `routes::create_api_router` (nest under a nameless root
//! router rather than a versioned prefix, since this surface binds to a
//! localhost-only port rather than a public service).

use std::collections::{BTreeMap, HashMap};

use agent_model::prelude::{ComponentStatus, ConfigValue, HealthReport, MonitoredFileSpec, Priority};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::errors::{AppError, AppResult};
use crate::processes::ProcessSortKey;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/api/metrics", get(metrics))
        .route("/api/control", post(control))
        .route("/api/processes", get(list_processes))
        .route("/api/processes/{pid}", get(process_detail))
        .route("/api/processes/{pid}/kill", post(kill_process))
        .route("/api/processes/{pid}/history", get(process_history))
        .route("/api/processes/{pid}/tree", get(process_tree))
        .route("/api/config", get(get_config).post(apply_config))
        .route("/api/config/reload", post(reload_config))
        .route("/api/config/schema", get(config_schema))
        .route("/api/monitored-files", get(list_monitored_files).post(add_monitored_file))
        .route("/api/monitored-files/{id}", post(replace_monitored_file).put(replace_monitored_file).delete(remove_monitored_file))
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let mut components = BTreeMap::new();
    components.insert("config_store".to_string(), ComponentStatus::Running);
    components.insert("telemetry_spool".to_string(), if state.spool.size().await.is_ok() { ComponentStatus::Running } else { ComponentStatus::Degraded });
    components.insert("suppression_cache".to_string(), ComponentStatus::Running);
    components.insert("live_logs".to_string(), if state.broadcaster_control.live_logs_enabled() { ComponentStatus::Running } else { ComponentStatus::Stopped });
    components.insert("live_metrics".to_string(), if state.broadcaster_control.live_metrics_enabled() { ComponentStatus::Running } else { ComponentStatus::Stopped });

    let overall = if components.values().any(|c| matches!(c, ComponentStatus::Degraded)) { "degraded" } else { "ok" };

    Json(HealthReport { status: overall.to_string(), node_id: state.node_id.clone(), version: state.version.to_string(), uptime_seconds: state.uptime_seconds(), components })
}

async fn status(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let snapshot = state.config.snapshot();
    let spool_stats = state.spool.stats().await?;
    Ok(Json(json!({
        "node_id": state.node_id,
        "uptime_seconds": state.uptime_seconds(),
        "config_version": snapshot.version,
        "monitored_files": snapshot.hot.monitored_files,
        "suppression_cached_rule_count": state.suppression.cached_rule_count(),
        "spool": spool_stats,
        "broadcasters": {
            "live_logs_enabled": state.broadcaster_control.live_logs_enabled(),
            "live_logs_subscribers": state.live_logs_tx.receiver_count(),
            "live_metrics_enabled": state.broadcaster_control.live_metrics_enabled(),
            "live_metrics_subscribers": state.live_metrics_tx.receiver_count(),
        },
    })))
}

async fn metrics(State(state): State<AppState>) -> Json<crate::metrics_counters::AgentMetricsSnapshot> {
    Json(state.metrics.snapshot())
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ControlCommand {
    StartLivelogs,
    StopLivelogs,
    StartTelemetry,
    StopTelemetry,
}

async fn control(State(state): State<AppState>, Json(body): Json<ControlCommand>) -> Json<serde_json::Value> {
    match body {
        ControlCommand::StartLivelogs => state.broadcaster_control.set_live_logs(true),
        ControlCommand::StopLivelogs => state.broadcaster_control.set_live_logs(false),
        ControlCommand::StartTelemetry => state.broadcaster_control.set_live_metrics(true),
        ControlCommand::StopTelemetry => state.broadcaster_control.set_live_metrics(false),
    }
    Json(json!({
        "live_logs_enabled": state.broadcaster_control.live_logs_enabled(),
        "live_metrics_enabled": state.broadcaster_control.live_metrics_enabled(),
    }))
}

#[derive(Debug, Deserialize)]
struct ProcessListQuery {
    limit: Option<usize>,
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
}

async fn list_processes(State(state): State<AppState>, Query(query): Query<ProcessListQuery>) -> AppResult<Json<serde_json::Value>> {
    let sort_by = query.sort_by.as_deref().map(|s| s.parse::<ProcessSortKey>()).transpose().map_err(|_| AppError::bad_request("sortBy must be 'cpu' or 'memory'"))?.unwrap_or(ProcessSortKey::Cpu);
    let limit = query.limit.unwrap_or(20);
    Ok(Json(json!(state.processes.list(sort_by, limit))))
}

async fn process_detail(State(state): State<AppState>, Path(pid): Path<u32>) -> AppResult<Json<serde_json::Value>> {
    state.processes.detail(pid).map(|d| Json(json!(d))).ok_or_else(|| AppError::not_found(format!("no process with pid {pid}")))
}

#[derive(Debug, Deserialize, Default)]
struct KillRequest {
    #[serde(default)]
    force: bool,
}

async fn kill_process(State(state): State<AppState>, Path(pid): Path<u32>, body: Option<Json<KillRequest>>) -> AppResult<Json<serde_json::Value>> {
    let force = body.map(|Json(b)| b.force).unwrap_or(false);
    match state.processes.kill(pid, force) {
        Some(true) => Ok(Json(json!({ "success": true, "pid": pid }))),
        Some(false) => Err(AppError::internal(format!("failed to signal pid {pid}"))),
        None => Err(AppError::not_found(format!("no process with pid {pid}"))),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    hours: Option<u64>,
}

async fn process_history(State(state): State<AppState>, Path(pid): Path<u32>, Query(query): Query<HistoryQuery>) -> AppResult<Json<serde_json::Value>> {
    let hours = query.hours.unwrap_or(1);
    let (points, statistics) = state.processes.history(pid, hours).ok_or_else(|| AppError::not_found(format!("no history for pid {pid}")))?;
    Ok(Json(json!({ "pid": pid, "points": points, "statistics": statistics })))
}

async fn process_tree(State(state): State<AppState>, Path(pid): Path<u32>) -> AppResult<Json<serde_json::Value>> {
    state.processes.tree(pid).map(|t| Json(json!(t))).ok_or_else(|| AppError::not_found(format!("no process with pid {pid}")))
}

async fn get_config(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.config.snapshot();
    Json(json!({
        "version": snapshot.version,
        "static": {
            "node_id": snapshot.static_config.node_id,
            "control_api_port": snapshot.static_config.control_api_port,
            "live_logs_port": snapshot.static_config.live_logs_port,
            "live_metrics_port": snapshot.static_config.live_metrics_port,
            "broker_url": snapshot.static_config.broker_url,
            "backend_url": snapshot.static_config.backend_url,
            "alert_ticket_url": snapshot.static_config.alert_ticket_url,
            "heartbeat_url": snapshot.static_config.heartbeat_url,
            "backend_auth_token_set": snapshot.static_config.backend_auth_token.is_some(),
            "spool_path": snapshot.static_config.spool_path,
            "suppression_rules_store_url": snapshot.static_config.suppression_rules_store_url,
            "log_file": snapshot.static_config.log_file,
            "sampler_interval_secs": snapshot.static_config.sampler_interval_secs,
            "publisher_interval_secs": snapshot.static_config.publisher_interval_secs,
            "heartbeat_interval_secs": snapshot.static_config.heartbeat_interval_secs,
            "http_request_timeout_secs": snapshot.static_config.http_request_timeout_secs,
            "retry_backoff_secs": snapshot.static_config.retry_backoff_secs,
            "spool_max_size": snapshot.static_config.spool_max_size,
        },
        "hot": {
            "log_level": snapshot.hot.log_level,
            "keywords": snapshot.hot.keywords,
            "max_tailers": snapshot.hot.max_tailers,
            "suppression_ttl_secs": snapshot.hot.suppression_ttl_secs,
            "monitored_files": snapshot.hot.monitored_files,
            "alert_rules": snapshot.hot.alert_rules,
        },
    }))
}

#[derive(Debug, Deserialize)]
struct ApplyConfigRequest {
    settings: HashMap<String, ConfigValue>,
}

async fn apply_config(State(state): State<AppState>, Json(body): Json<ApplyConfigRequest>) -> AppResult<Json<serde_json::Value>> {
    let changed = state.config.apply_overrides(&body.settings)?;
    Ok(Json(json!({ "changes": changed.len(), "details": changed })))
}

async fn reload_config(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let changed = state.config.reload_from_backend().await?;
    Ok(Json(json!({ "success": true, "changes": changed.len(), "details": changed })))
}

async fn config_schema() -> Json<serde_json::Value> {
    let entries: Vec<_> = agent_config::schema::SCHEMA
        .iter()
        .map(|d| json!({ "path": d.path, "type": d.type_tag, "hot_reloadable": d.hot_reloadable, "description": d.description }))
        .collect();
    Json(json!(entries))
}

async fn list_monitored_files(State(state): State<AppState>) -> Json<Vec<MonitoredFileSpec>> {
    Json(state.config.snapshot().hot.monitored_files.clone())
}

#[derive(Debug, Deserialize)]
struct MonitoredFileRequest {
    id: Option<String>,
    path: std::path::PathBuf,
    label: Option<String>,
    #[serde(default = "default_priority")]
    priority: Priority,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_priority() -> Priority {
    Priority::Medium
}

fn default_enabled() -> bool {
    true
}

async fn add_monitored_file(State(state): State<AppState>, Json(body): Json<MonitoredFileRequest>) -> AppResult<Json<MonitoredFileSpec>> {
    let mut files = state.config.snapshot().hot.monitored_files.clone();
    let id = body.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let spec = MonitoredFileSpec::new(id, body.path, body.label, body.priority, body.enabled);
    files.push(spec.clone());
    state.config.set_monitored_files(files)?;
    Ok(Json(spec))
}

async fn replace_monitored_file(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<MonitoredFileRequest>) -> AppResult<Json<MonitoredFileSpec>> {
    let mut files = state.config.snapshot().hot.monitored_files.clone();
    let Some(slot) = files.iter_mut().find(|f| f.id == id) else {
        return Err(AppError::not_found(format!("no monitored file with id {id}")));
    };
    let spec = MonitoredFileSpec::new(id, body.path, body.label, body.priority, body.enabled);
    *slot = spec.clone();
    state.config.set_monitored_files(files)?;
    Ok(Json(spec))
}

async fn remove_monitored_file(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<impl IntoResponse> {
    let mut files = state.config.snapshot().hot.monitored_files.clone();
    let before = files.len();
    files.retain(|f| f.id != id);
    if files.len() == before {
        return Err(AppError::not_found(format!("no monitored file with id {id}")));
    }
    state.config.set_monitored_files(files)?;
    Ok(Json(json!({ "success": true })))
}
