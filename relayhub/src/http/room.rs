//! Room endpoints
//!
//! - `POST /room` - create a room with its own UDP ingress
//! - `GET /rooms` - list rooms and their participants
//! - `POST /switch` - move a viewer between rooms (empty `roomId` detaches)

use axum::{extract::State, Json};
use bytes::Bytes;
use relayhub_sfu::{RoomId, SwitchOutcome, ViewerId};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{parse_body, AppResult, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateRoomRequest {
    /// Fixed ingress port; OS-assigned when absent
    pub port: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub id: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: String,
    pub packets_sent: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub id: String,
    pub port: u16,
    pub packets_received: u64,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListRoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwitchRequest {
    pub peer_connection_id: String,
    pub room_id: String,
}

/// Create a new room
pub async fn create_room(State(state): State<AppState>, body: Bytes) -> AppResult<Json<CreateRoomResponse>> {
    let req: CreateRoomRequest = parse_body(&body)?;

    let room = state.registry.add_room(req.port.unwrap_or(0)).await?;

    Ok(Json(CreateRoomResponse {
        id: room.id.to_string(),
        port: room.port(),
    }))
}

/// List all rooms, ordered by ingress port
pub async fn list_rooms(State(state): State<AppState>) -> Json<ListRoomsResponse> {
    let mut rooms = Vec::new();

    for room in state.registry.list_rooms() {
        let mut participants: Vec<ParticipantInfo> = room
            .participants()
            .await
            .into_iter()
            .map(|p| ParticipantInfo {
                id: p.id.to_string(),
                packets_sent: p.stats().packets_sent,
            })
            .collect();
        participants.sort_by(|a, b| a.id.cmp(&b.id));

        rooms.push(RoomInfo {
            id: room.id.to_string(),
            port: room.port(),
            packets_received: room.get_stats().await.packets_received,
            participants,
        });
    }

    rooms.sort_by_key(|r| r.port);
    Json(ListRoomsResponse { rooms })
}

/// Switch a viewer to another room
pub async fn switch(State(state): State<AppState>, body: Bytes) -> AppResult<Json<SwitchOutcome>> {
    let req: SwitchRequest = parse_body(&body)?;
    let viewer_id = ViewerId::from(req.peer_connection_id);
    let room_id = RoomId::from(req.room_id);

    let outcome = state.registry.switch(&viewer_id, Some(&room_id)).await?;
    info!(viewer_id = %viewer_id, outcome = ?outcome, "Switch requested");

    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{call, test_router};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_create_room_without_content_type() {
        let (router, registry) = test_router(false);

        let (status, body) = call(&router, "POST", "/room", "{}").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["port"].as_u64().is_some_and(|p| p > 0));
        assert_eq!(registry.list_rooms().len(), 1);
    }

    #[tokio::test]
    async fn test_list_rooms_shows_participants() {
        let (router, _) = test_router(false);
        let (_, room) = call(&router, "POST", "/room", "").await;
        let (_, viewer) = call(&router, "POST", "/pc", r#"{"offer":{"type":"offer","sdp":""}}"#).await;

        let switch_body = format!(
            r#"{{"peerConnectionId":"{}","roomId":"{}"}}"#,
            viewer["id"].as_str().expect("viewer id"),
            room["id"].as_str().expect("room id"),
        );
        let (status, outcome) = call(&router, "POST", "/switch", &switch_body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "joined");
        assert_eq!(outcome["roomId"], room["id"]);

        let (status, list) = call(&router, "GET", "/rooms", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["rooms"][0]["id"], room["id"]);
        assert_eq!(list["rooms"][0]["participants"][0]["id"], viewer["id"]);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_room_reports_target_not_found() {
        let (router, _) = test_router(false);
        let (_, viewer) = call(&router, "POST", "/pc", r#"{"offer":{"type":"offer","sdp":""}}"#).await;

        let body = format!(
            r#"{{"peerConnectionId":"{}","roomId":"nope"}}"#,
            viewer["id"].as_str().expect("viewer id")
        );
        let (status, outcome) = call(&router, "POST", "/switch", &body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["outcome"], "target_not_found");
    }

    #[tokio::test]
    async fn test_switch_with_empty_room_detaches() {
        let (router, _) = test_router(false);
        let (_, viewer) = call(&router, "POST", "/pc", r#"{"offer":{"type":"offer","sdp":""}}"#).await;

        let body = format!(
            r#"{{"peerConnectionId":"{}","roomId":""}}"#,
            viewer["id"].as_str().expect("viewer id")
        );
        let (_, outcome) = call(&router, "POST", "/switch", &body).await;

        assert_eq!(outcome["outcome"], "detached");
    }

    #[tokio::test]
    async fn test_switch_unknown_viewer_is_not_found() {
        let (router, _) = test_router(false);

        let (status, body) = call(&router, "POST", "/switch", r#"{"peerConnectionId":"ghost","roomId":""}"#).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (router, _) = test_router(false);
        let (status, _) = call(&router, "POST", "/switch", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
