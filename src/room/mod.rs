// Public API - what other modules can use
pub use cleanup_task::{start_cleanup_task, CleanupConfig, CleanupTaskHandle, RoomSweeper};
pub use handlers::list_rooms;
pub use listing::{build_room_list, RoomListInputs};
pub use tracker::{RoomPresenceTracker, RoomStat};
pub use types::{
    display_room_name, normalize_room_name, RoomInfo, RoomListResponse, RoomQuery, DEFAULT_ROOM,
};

// Internal modules
mod cleanup_task;
mod handlers;
mod listing;
mod tracker;
mod types;
