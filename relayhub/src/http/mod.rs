// Module: http
// Control plane: rooms, viewer sessions, switching

pub mod error;
pub mod health;
pub mod room;
pub mod viewer;

use axum::{
    routing::{get, post},
    Router,
};
use relayhub_sfu::Registry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Create the HTTP router with all routes
pub fn create_router(registry: Arc<Registry>, static_dir: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/room", post(room::create_room))
        .route("/rooms", get(room::list_rooms))
        .route("/switch", post(room::switch))
        .route("/pc", post(viewer::create_viewer))
        .route("/health", get(health::health))
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse a request body as JSON regardless of its content type
pub(crate) fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> AppResult<T> {
    if body.is_empty() {
        return serde_json::from_slice(b"{}").map_err(AppError::from);
    }
    serde_json::from_slice(body).map_err(AppError::from)
}
