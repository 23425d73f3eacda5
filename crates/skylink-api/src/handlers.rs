//! HTTP API handlers — exposes registry state as JSON.

use axum::{extract::State, Json};
use serde::Serialize;

use skylink_registry::{ClientTable, RelayStats};

#[derive(Clone)]
pub struct ApiState {
    pub table: ClientTable,
    pub stats: RelayStats,
}

// ── /status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub clients_online: usize,
    pub frames_relayed: u64,
    pub frames_undeliverable: u64,
    pub frames_dropped: u64,
    pub uptime_secs: u64,
}

pub async fn handle_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let s = state.stats.snapshot();
    Json(StatusResponse {
        clients_online: state.table.len(),
        frames_relayed: s.relayed,
        frames_undeliverable: s.undeliverable,
        frames_dropped: s.dropped,
        uptime_secs: s.uptime_secs,
    })
}

// ── /clients ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<ClientInfo>,
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub uid: String,
    pub parent: String,
    pub addr: String,
    pub connected_secs: u64,
}

pub async fn handle_clients(State(state): State<ApiState>) -> Json<ClientsResponse> {
    let mut clients: Vec<ClientInfo> = state
        .table
        .iter()
        .map(|e| ClientInfo {
            uid: e.key().to_string(),
            parent: e.value().parent.to_string(),
            addr: e.value().addr.to_string(),
            connected_secs: e.value().connected_at.elapsed().as_secs(),
        })
        .collect();
    clients.sort_by(|a, b| a.uid.cmp(&b.uid));

    Json(ClientsResponse { clients })
}
