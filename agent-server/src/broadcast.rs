//! Live log and live metric WebSocket broadcasters (C9/C10, spec §6).
//!
//! Grounded on the teacher's `infra::websocket` connection lifecycle
//! (`handlers/handle_websocket.rs`: split the socket, forward a channel
//! into the sink, drain the inbound half until close, clean up on either
//! side ending) but fed from a `tokio::sync::broadcast` channel — the same
//! primitive `agent_core::sampler::MetricSampler` already publishes onto —
//! rather than the teacher's `DashMap`-of-connections `ConnectionManager`.
//! A subscriber that falls behind receives `RecvError::Lagged` from the
//! broadcast channel instead of blocking the sender; this connection is
//! then closed rather than retried, satisfying "a single blocked or slow
//! subscriber MUST NOT block others" (P8) without needing the teacher's
//! manual connection bookkeeping.

use agent_model::prelude::MetricSnapshot;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LiveLogFrame {
    Connection { status: &'static str, node_id: String, timestamp: DateTime<Utc> },
    LiveLog { node_id: String, timestamp: DateTime<Utc>, log: agent_model::prelude::ErrorEvent },
}

#[derive(Debug, Serialize)]
struct LiveMetricsWelcome {
    node_id: String,
    interval: u64,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct DiskIoWire {
    read_mib_per_sec: f64,
    write_mib_per_sec: f64,
}

#[derive(Debug, Serialize)]
struct DiskWire {
    disk_usage: std::collections::HashMap<String, agent_model::prelude::MountUsage>,
    disk_io: DiskIoWire,
}

#[derive(Debug, Serialize)]
struct MetricsWire {
    cpu: agent_model::prelude::CpuStats,
    memory: agent_model::prelude::MemoryStats,
    disk: DiskWire,
    network: agent_model::prelude::NetworkStats,
    processes: agent_model::prelude::ProcessStats,
}

#[derive(Debug, Serialize)]
struct LiveMetricsFrame {
    timestamp: DateTime<Utc>,
    node_id: String,
    metrics: MetricsWire,
}

impl From<&MetricSnapshot> for MetricsWire {
    fn from(snapshot: &MetricSnapshot) -> Self {
        Self {
            cpu: snapshot.cpu.clone(),
            memory: snapshot.memory.clone(),
            disk: DiskWire { disk_usage: snapshot.disk.usage.clone(), disk_io: DiskIoWire { read_mib_per_sec: snapshot.disk.read_mib_per_sec, write_mib_per_sec: snapshot.disk.write_mib_per_sec } },
            network: snapshot.network.clone(),
            processes: snapshot.processes.clone(),
        }
    }
}

pub async fn live_logs_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_live_log_socket(socket, state))
}

async fn handle_live_log_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.live_logs_tx.subscribe();

    let welcome = LiveLogFrame::Connection { status: "connected", node_id: state.node_id.clone(), timestamp: Utc::now() };
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {} // no inbound protocol on this stream
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(log) => {
                        if !state.broadcaster_control.live_logs_enabled() {
                            continue;
                        }
                        let frame = LiveLogFrame::LiveLog { node_id: state.node_id.clone(), timestamp: Utc::now(), log };
                        if send_json(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "live log subscriber lagged, disconnecting");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

pub async fn live_metrics_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_live_metrics_socket(socket, state))
}

async fn handle_live_metrics_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.live_metrics_tx.subscribe();
    let interval = state.config.snapshot().static_config.sampler_interval_secs;

    let welcome = LiveMetricsWelcome { node_id: state.node_id.clone(), interval, timestamp: Utc::now() };
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
            snapshot = rx.recv() => {
                match snapshot {
                    Ok(snapshot) => {
                        if !state.broadcaster_control.live_metrics_enabled() {
                            continue;
                        }
                        let frame = LiveMetricsFrame { timestamp: snapshot.timestamp, node_id: state.node_id.clone(), metrics: MetricsWire::from(&snapshot) };
                        if send_json(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "live metrics subscriber lagged, disconnecting");
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn send_json<S: Serialize>(sender: &mut SplitSink<WebSocket, Message>, value: &S) -> Result<(), ()> {
    let text = serde_json::to_string(value).map_err(|_| ())?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}
