// Library crate for the cloud clipboard fan-out server
// This file exposes the public API for the binary and integration tests

pub mod clipboard;
pub mod config;
pub mod device;
pub mod message;
pub mod room;
pub mod shared;
pub mod websockets;

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

// Re-export commonly used types for easier access in tests
pub use clipboard::{ClientInfo, ClipboardService, Session};
pub use config::Config;
pub use message::{EventLog, History, HistoryStore, InMemoryHistoryStore, JsonFileHistoryStore, Message, Sender};
pub use room::{RoomPresenceTracker, RoomSweeper};
pub use shared::{AppError, AppState};
pub use websockets::{BroadcastEngine, ConnectionHandle, ConnectionRegistry, OutboundEvent, OutboundSink, SocketError};

/// Builds the HTTP surface, mounted under `server.prefix` when one is configured
pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/push", get(websockets::push_handler))
        .route("/content/latest", get(clipboard::get_latest_content))
        .route("/content/:id", get(clipboard::get_content))
        .route("/revoke/all", delete(clipboard::clear_room))
        .route("/revoke/:id", delete(clipboard::revoke_message))
        .route("/rooms", get(room::list_rooms));

    let prefix = state.config.server.prefix.trim_matches('/').to_string();
    let app = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&format!("/{}", prefix), routes)
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
