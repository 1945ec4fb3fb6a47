use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum number of characters kept when previewing content in logs
const PREVIEW_CHARS: usize = 30;

/// Sender device descriptor as parsed from the user agent: `type`, `os`, `browser`
pub type SenderDevice = HashMap<String, String>;

/// Fields shared by every stored message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMeta {
    /// Unique message ID, assigned by the event log when <= 0
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub room: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "senderIP", default)]
    pub sender_ip: String,
    #[serde(rename = "senderDevice", default, deserialize_with = "null_as_default")]
    pub sender_device: SenderDevice,
}

/// Accepts `null` wherever a default value makes sense (older history files write nil maps as null)
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextMessage {
    #[serde(flatten)]
    pub meta: MessageMeta,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileMessage {
    #[serde(flatten)]
    pub meta: MessageMeta,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    /// Storage key of the uploaded file
    #[serde(default)]
    pub cache: String,
    /// Unix timestamp after which the stored file is gone
    #[serde(default)]
    pub expire: i64,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A broadcastable message, tagged by `type` on the wire and on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text(TextMessage),
    File(FileMessage),
}

/// Type tag of a message
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl Message {
    /// Creates a text message with an unset ID
    pub fn text(room: impl Into<String>, content: impl Into<String>, sender: Sender) -> Self {
        Message::Text(TextMessage {
            meta: sender.into_meta(room.into()),
            content: content.into(),
        })
    }

    pub fn meta(&self) -> &MessageMeta {
        match self {
            Message::Text(text) => &text.meta,
            Message::File(file) => &file.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut MessageMeta {
        match self {
            Message::Text(text) => &mut text.meta,
            Message::File(file) => &mut file.meta,
        }
    }

    pub fn id(&self) -> i64 {
        self.meta().id
    }

    pub fn set_id(&mut self, id: i64) {
        self.meta_mut().id = id;
    }

    pub fn room(&self) -> &str {
        &self.meta().room
    }

    pub fn timestamp(&self) -> i64 {
        self.meta().timestamp
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text(_) => MessageKind::Text,
            Message::File(_) => MessageKind::File,
        }
    }

    /// Short content preview for log lines, cut at 30 characters
    pub fn preview(&self) -> String {
        let content = match self {
            Message::Text(text) => text.content.clone(),
            Message::File(file) => format!("[file] {}", file.name),
        };

        if content.chars().count() > PREVIEW_CHARS {
            let truncated: String = content.chars().take(PREVIEW_CHARS).collect();
            format!("{}...", truncated)
        } else {
            content
        }
    }

    /// Whether this message is visible from `room`.
    ///
    /// An empty filter sees everything and a message without a room is visible everywhere.
    pub fn visible_in(&self, room: &str) -> bool {
        room.is_empty() || self.room().is_empty() || self.room() == room
    }
}

/// Who submitted a message
#[derive(Debug, Clone, Default)]
pub struct Sender {
    pub ip: String,
    pub device: SenderDevice,
}

impl Sender {
    pub fn new(ip: impl Into<String>, device: SenderDevice) -> Self {
        Self {
            ip: ip.into(),
            device,
        }
    }

    fn into_meta(self, room: String) -> MessageMeta {
        MessageMeta {
            id: 0,
            room,
            timestamp: chrono::Utc::now().timestamp(),
            sender_ip: self.ip,
            sender_device: self.device,
        }
    }
}
