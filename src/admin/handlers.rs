use axum::{extract::State, Json};
use serde::Serialize;

use crate::dispatch::DispatchSettings;
use crate::http::server::AppState;
use crate::load_balancer::BackendSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub backends: usize,
    pub penalized: usize,
    pub cursor: usize,
    pub settings: DispatchSettings,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let dispatcher = &state.dispatcher;
    let pool = dispatcher.pool();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        backends: pool.len(),
        penalized: pool.penalized_count(),
        cursor: pool.cursor_position(),
        settings: dispatcher.settings().clone(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendSnapshot>> {
    Json(state.dispatcher.pool().status_snapshot())
}
