use axum::{
    extract::{ws::WebSocket, ConnectInfo, Query, State, WebSocketUpgrade},
    http::{header::USER_AGENT, HeaderMap},
    response::Response,
};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::socket::{run_read_loop, OutboundSink, WebSocketSink};
use crate::clipboard::{ClientInfo, ClipboardService};
use crate::device::client_ip;
use crate::room::RoomQuery;
use crate::shared::AppState;

/// WebSocket endpoint clients subscribe to
/// GET /push?room=<room>
pub async fn push_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let client = ClientInfo {
        remote_addr: peer.to_string(),
        ip: client_ip(&headers, Some(peer)),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };

    info!(
        room_id = %query.room,
        client_ip = %client.ip,
        "WebSocket connection requested"
    );

    let service = state.service.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, service, query.room, client))
}

/// Drives one upgraded connection from registration to cleanup
async fn handle_socket(socket: WebSocket, service: Arc<ClipboardService>, room: String, client: ClientInfo) {
    let (write, read) = socket.split();
    let sink: Arc<dyn OutboundSink> = Arc::new(WebSocketSink::new(write));

    let session = match service.register_connection(sink, &room, &client).await {
        Ok(session) => session,
        Err(e) => {
            warn!(remote_addr = %client.remote_addr, error = %e, "Connection dropped during setup");
            return;
        }
    };

    match run_read_loop(read, &session.device_id).await {
        Ok(()) => debug!(device_id = %session.device_id, "WebSocket closed by client"),
        Err(e) => warn!(device_id = %session.device_id, error = %e, "WebSocket read error"),
    }

    service.unregister_connection(session.handle).await;
}
