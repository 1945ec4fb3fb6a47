use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::device::DeviceMeta;
use crate::message::{Message, TextMessage};

/// Event names for Server -> Client WebSocket frames
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display, strum_macros::AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum EventName {
    Connect,
    Disconnect,
    Receive,
    Update,
    Revoke,
    ClearAll,
    Config,
}

/// One outbound frame: `{"event": ..., "data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEvent {
    pub event: EventName,
    pub data: Value,
}

impl OutboundEvent {
    fn new(event: EventName, data: impl Serialize) -> Self {
        Self {
            event,
            data: serde_json::to_value(data).unwrap_or_default(),
        }
    }

    /// A device joined the room
    pub fn connect(device: &DeviceMeta) -> Self {
        Self::new(EventName::Connect, device)
    }

    pub fn disconnect(device_id: &str) -> Self {
        Self::new(EventName::Disconnect, json!({ "id": device_id }))
    }

    /// A new message, or a replayed one on join
    pub fn receive(message: &Message) -> Self {
        Self::new(EventName::Receive, message)
    }

    pub fn update(message: &TextMessage) -> Self {
        Self::new(EventName::Update, Message::Text(message.clone()))
    }

    pub fn revoke(id: i64) -> Self {
        Self::new(EventName::Revoke, json!({ "id": id }))
    }

    pub fn clear_all(room: &str) -> Self {
        Self::new(EventName::ClearAll, json!({ "room": room }))
    }

    pub fn config(config: &ClientConfig) -> Self {
        Self::new(EventName::Config, config)
    }

    /// Serializes the frame once so it can be written to every recipient
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
