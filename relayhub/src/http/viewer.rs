//! Viewer session endpoint
//!
//! `POST /pc` takes the browser's SDP offer and returns the answer together
//! with the viewer id used by `/switch`.

use axum::{extract::State, Json};
use bytes::Bytes;
use relayhub_sfu::RTCSessionDescription;
use serde::{Deserialize, Serialize};

use super::{parse_body, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateViewerRequest {
    pub offer: RTCSessionDescription,
}

#[derive(Debug, Serialize)]
pub struct CreateViewerResponse {
    pub id: String,
    pub answer: RTCSessionDescription,
}

pub async fn create_viewer(State(state): State<AppState>, body: Bytes) -> AppResult<Json<CreateViewerResponse>> {
    let req: CreateViewerRequest = parse_body(&body)?;

    let session = state.registry.add_viewer(req.offer).await?;

    Ok(Json(CreateViewerResponse {
        id: session.stream.id.to_string(),
        answer: session.answer,
    }))
}
