use axum::{extract::State, Json};
use tracing::{info, instrument};

use super::types::RoomListResponse;
use crate::shared::{AppError, AppState};

/// HTTP handler for listing rooms
///
/// GET /rooms
/// Returns 403 unless `server.roomList` is enabled
#[instrument(name = "list_rooms", skip(state))]
pub async fn list_rooms(State(state): State<AppState>) -> Result<Json<RoomListResponse>, AppError> {
    if !state.config.server.room_list {
        return Err(AppError::Forbidden("Room list is disabled".to_string()));
    }

    let rooms = state.service.room_list();
    info!(room_count = rooms.len(), "Rooms listed successfully");

    Ok(Json(RoomListResponse { rooms }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Sender};
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    #[tokio::test]
    async fn test_list_rooms_forbidden_when_disabled() {
        let app = Router::new()
            .route("/rooms", get(list_rooms))
            .with_state(AppStateBuilder::new().build());

        let response = app
            .oneshot(Request::builder().uri("/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Room list is disabled");
    }

    #[tokio::test]
    async fn test_list_rooms_includes_message_rooms() {
        let state = AppStateBuilder::new().with_room_list(true).build();
        state
            .service
            .append_message(Message::text("", "hi", Sender::default()))
            .await;
        state
            .service
            .append_message(Message::text("lab", "hi", Sender::default()))
            .await;

        let app = Router::new()
            .route("/rooms", get(list_rooms))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri("/rooms").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let list: RoomListResponse = serde_json::from_slice(&body).unwrap();

        let mut names: Vec<&str> = list.rooms.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["", "lab"]);
        assert!(list.rooms.iter().all(|r| r.message_count == 1 && !r.is_active));
    }
}
