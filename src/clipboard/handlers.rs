use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{info, instrument};

use super::types::ClearRoomResponse;
use crate::message::Message;
use crate::room::RoomQuery;
use crate::shared::{AppError, AppState};

/// Accepts `12` and `12.json`
fn parse_message_id(raw: &str) -> Result<i64, AppError> {
    raw.trim_end_matches(".json")
        .parse::<i64>()
        .map_err(|_| AppError::BadRequest(format!("Invalid message ID: {}", raw)))
}

/// HTTP handler for fetching one message
///
/// GET /content/:id?room=
#[instrument(name = "get_content", skip(state))]
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Message>, AppError> {
    let id = parse_message_id(&id)?;

    state
        .service
        .find_message(id, &query.room)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Message {} not found", id)))
}

/// HTTP handler for the newest message visible from a room
///
/// GET /content/latest?room=
#[instrument(name = "get_latest_content", skip(state))]
pub async fn get_latest_content(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Message>, AppError> {
    state
        .service
        .latest_message(&query.room)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No messages".to_string()))
}

/// HTTP handler for revoking one message
///
/// DELETE /revoke/:id?room=
#[instrument(name = "revoke_message", skip(state))]
pub async fn revoke_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<Message>, AppError> {
    let id = parse_message_id(&id)?;
    let revoked = state.service.revoke_message(id, &query.room).await?;
    Ok(Json(revoked))
}

/// HTTP handler for clearing a room
///
/// DELETE /revoke/all?room=
#[instrument(name = "clear_room", skip(state))]
pub async fn clear_room(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Json<ClearRoomResponse> {
    let removed = state.service.clear_room(&query.room).await;
    info!(room_id = %query.room, removed = removed.len(), "Room cleared via HTTP");

    Json(ClearRoomResponse {
        room: query.room,
        removed,
    })
}
