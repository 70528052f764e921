//! JSON control surface
//!
//! Every `/api/*` endpoint answers with a `success` verdict plus a
//! human-readable `message` on failure. `room-info` always answers
//! 200 with the verdict in the body; the WebSocket upgrade path reuses
//! the same body shape but rejects with a real 4xx (see `ws`).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use chuan_core::{code, SignalError};
use chuan_signal::ROOM_MAX_AGE;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub success: bool,
    pub code: String,
    pub message: String,
}

/// Body shared by room-info answers and upgrade rejections
#[derive(Debug, Default, Serialize)]
pub struct RoomInfoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_room_full: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    pub code: Option<String>,
}

/// HTTP status for a domain error crossing the upgrade boundary
pub fn status_for(err: &SignalError) -> StatusCode {
    match err {
        SignalError::BadRequest(_) => StatusCode::BAD_REQUEST,
        SignalError::RoomNotFound => StatusCode::NOT_FOUND,
        SignalError::RoomExpired | SignalError::RoomClosed => StatusCode::GONE,
        SignalError::SlotTaken | SignalError::RoomFull => StatusCode::CONFLICT,
        SignalError::CodeSpaceExhausted
        | SignalError::Transport(_)
        | SignalError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Verdict body for a domain error, mirroring the room-info shape
pub fn error_body(code: Option<&str>, err: &SignalError) -> RoomInfoResponse {
    RoomInfoResponse {
        success: false,
        code: code.map(str::to_string),
        expired: matches!(err, SignalError::RoomExpired).then_some(true),
        message: Some(err.to_string()),
        ..Default::default()
    }
}

/// POST /api/create-room: allocate a room; the request body is ignored
pub async fn create_room(State(state): State<AppState>) -> Response {
    match state.registry.create() {
        Ok(code) => {
            info!(%code, "room created");
            Json(CreateRoomResponse {
                success: true,
                code,
                message: "room created".to_string(),
            })
            .into_response()
        }
        Err(err) => (status_for(&err), Json(error_body(None, &err))).into_response(),
    }
}

/// GET /api/room-info?code=…: occupancy snapshot and admission hints
pub async fn room_info(State(state): State<AppState>, Query(q): Query<RoomQuery>) -> Response {
    let Some(raw) = q.code.as_deref().filter(|c| !c.is_empty()) else {
        let err = SignalError::BadRequest("missing room code".to_string());
        return Json(error_body(None, &err)).into_response();
    };

    let normalized = code::normalize_code(raw);
    if !code::validate_code(&normalized) {
        let err = SignalError::BadRequest("invalid room code".to_string());
        return Json(error_body(Some(&normalized), &err)).into_response();
    }

    let Some(room) = state.registry.lookup(&normalized) else {
        return Json(error_body(Some(&normalized), &SignalError::RoomNotFound)).into_response();
    };

    if room.is_expired(ROOM_MAX_AGE) {
        return Json(error_body(Some(&normalized), &SignalError::RoomExpired)).into_response();
    }

    let status = room.status();
    Json(RoomInfoResponse {
        success: true,
        code: Some(normalized),
        is_room_full: Some(status.transferring),
        sender_online: Some(status.sender_online),
        receiver_online: Some(status.receiver_online),
        ..Default::default()
    })
    .into_response()
}

/// GET /api/turn/stats: counter snapshot, error verdict when disabled
pub async fn turn_stats(State(state): State<AppState>) -> Response {
    match &state.turn {
        Some(turn) => Json(json!({
            "success": true,
            "data": turn.stats(),
        }))
        .into_response(),
        None => Json(json!({
            "success": false,
            "message": "TURN server not enabled",
        }))
        .into_response(),
    }
}

/// GET /api/turn/config: the descriptor clients add to their ICE list
pub async fn turn_config(State(state): State<AppState>) -> Response {
    let descriptor = state.turn.as_ref().and_then(|turn| turn.descriptor());
    match descriptor {
        Some(descriptor) => Json(json!({
            "success": true,
            "data": descriptor,
        }))
        .into_response(),
        None => Json(json!({
            "success": false,
            "message": "TURN server not enabled or not running",
        }))
        .into_response(),
    }
}

/// GET /api/admin/status: composite registry + TURN health
pub async fn admin_status(State(state): State<AppState>) -> Response {
    let turn = match &state.turn {
        Some(turn) => serde_json::to_value(turn.stats()).unwrap_or_default(),
        None => json!({
            "isRunning": false,
            "message": "TURN server not enabled",
        }),
    };

    Json(json!({
        "success": true,
        "data": {
            "webrtc": {
                "is_running": true,
                "active_rooms": state.registry.room_count(),
                "active_peers": state.registry.peer_count(),
            },
            "turn": turn,
        },
    }))
    .into_response()
}

/// Verdict-shaped answer for a wrong HTTP method on an API path
pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "success": false,
            "message": "method not allowed",
        })),
    )
        .into_response()
}
