use serde::{Deserialize, Serialize};

/// Name of the room used when a client does not ask for one
pub const DEFAULT_ROOM: &str = "default";

/// Maps the empty room name to the default room; every other name is kept as is
pub fn normalize_room_name(room: &str) -> &str {
    if room.is_empty() {
        DEFAULT_ROOM
    } else {
        room
    }
}

/// Name shown to clients: the default room is listed as ""
pub fn display_room_name(room: &str) -> &str {
    if room == DEFAULT_ROOM {
        ""
    } else {
        room
    }
}

/// Optional `?room=` query parameter shared by the HTTP and WebSocket surfaces
#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    #[serde(default)]
    pub room: String,
}

/// One entry of the room listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub name: String,
    pub message_count: u64,
    pub device_count: usize,
    pub last_active: i64,
    pub is_active: bool,
}

/// Response for GET /rooms
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomInfo>,
}
