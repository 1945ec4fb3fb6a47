use serde::Serialize;
use thiserror::Error;

use crate::device::UserAgentInfo;
use crate::message::Sender;
use crate::websockets::{ConnectionHandle, RegistryError, SocketError};

/// What the push endpoint knows about a connecting client
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    /// Peer address as `ip:port`, part of the device hash
    pub remote_addr: String,
    /// Client IP after proxy headers, recorded on messages
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    /// Sender recorded on messages submitted by this client
    pub fn sender(&self) -> Sender {
        Sender::new(self.ip.clone(), UserAgentInfo::parse(&self.user_agent).sender_device())
    }
}

/// A registered connection
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub handle: ConnectionHandle,
    pub device_id: String,
    /// Normalized room
    pub room: String,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The initial peer sync or history replay could not be written; the connection was dropped
    #[error("Initial sync failed: {0}")]
    InitialSync(#[from] SocketError),
}

/// Response for DELETE /revoke/all
#[derive(Debug, Serialize)]
pub struct ClearRoomResponse {
    pub room: String,
    pub removed: Vec<i64>,
}
