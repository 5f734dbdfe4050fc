use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub viewers: usize,
}

/// Liveness probe with registry counts
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.registry.get_stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        rooms: stats.rooms,
        viewers: stats.viewers,
    })
}
