// Public API - what other modules can use
pub use handlers::{clear_room, get_content, get_latest_content, revoke_message};
pub use service::ClipboardService;
pub use types::{ClearRoomResponse, ClientInfo, ConnectionError, Session};

// Internal modules
mod handlers;
mod service;
mod types;
