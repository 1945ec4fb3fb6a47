use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::models::{null_as_default, Message};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt history data: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("Failed to encode history: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Metadata of an uploaded file kept next to the message history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub name: String,
    pub uuid: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "uploadTime", default)]
    pub upload_time: i64,
    #[serde(rename = "expireTime", default)]
    pub expire_time: i64,
}

/// On-disk shape of the message history
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct History {
    #[serde(default, deserialize_with = "null_as_default")]
    pub file: Vec<StoredFile>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub receive: Vec<Message>,
    #[serde(rename = "nextId", default, skip_serializing_if = "is_zero")]
    pub next_id: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Storage backend for the message history snapshot
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Loads the last snapshot. `Ok(None)` when nothing was saved yet.
    async fn load(&self) -> Result<Option<History>, PersistenceError>;

    async fn save(&self, history: &History) -> Result<(), PersistenceError>;
}

/// JSON file implementation of HistoryStore
pub struct JsonFileHistoryStore {
    path: PathBuf,
}

impl JsonFileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<History>, PersistenceError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("History file does not exist, starting empty");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<History>(&data) {
            Ok(history) => {
                debug!(messages = history.receive.len(), "History file parsed");
                Ok(Some(history))
            }
            Err(e) => {
                warn!(error = %e, "History file is corrupt, discarding it");
                if let Err(remove_err) = tokio::fs::remove_file(&self.path).await {
                    warn!(error = %remove_err, "Failed to remove corrupt history file");
                }
                Err(PersistenceError::Corrupt(e))
            }
        }
    }

    #[instrument(skip(self, history), fields(path = %self.path.display()))]
    async fn save(&self, history: &History) -> Result<(), PersistenceError> {
        let data = serde_json::to_vec_pretty(history).map_err(PersistenceError::Encode)?;
        tokio::fs::write(&self.path, data).await?;
        debug!(messages = history.receive.len(), "History saved");
        Ok(())
    }
}

/// In-memory implementation of HistoryStore for development and testing
#[derive(Default)]
pub struct InMemoryHistoryStore {
    saved: Mutex<Option<History>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: History) -> Self {
        Self {
            saved: Mutex::new(Some(history)),
        }
    }

    /// Last saved snapshot
    pub fn saved(&self) -> Option<History> {
        self.saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self) -> Result<Option<History>, PersistenceError> {
        Ok(self.saved())
    }

    async fn save(&self, history: &History) -> Result<(), PersistenceError> {
        *self
            .saved
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(history.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::event_log::EventLog;
    use crate::message::models::Sender;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("history.json"));

        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload_preserves_order_and_ids() {
        let dir = tempdir().unwrap();
        let store = JsonFileHistoryStore::new(dir.path().join("history.json"));

        let log = EventLog::new(10);
        for (room, content) in [("", "first"), ("x", "second"), ("y", "third")] {
            log.append(Message::text(room, content, Sender::default()));
        }
        log.remove_by_id(2);
        let (messages, next_id) = log.export();

        store
            .save(&History {
                file: vec![],
                receive: messages.clone(),
                next_id,
            })
            .await
            .unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        let reloaded = EventLog::new(10);
        reloaded.restore(loaded.receive, loaded.next_id);

        assert_eq!(reloaded.snapshot(""), messages);
        assert_eq!(reloaded.next_id(), 4);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let store = JsonFileHistoryStore::new(&path);

        let result = store.load().await;

        assert!(matches!(result, Err(PersistenceError::Corrupt(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_legacy_history_with_nulls_and_no_next_id() {
        let raw = r#"{"file": null, "receive": [
            {"id": 4, "type": "text", "room": "", "timestamp": 1, "senderIP": "", "senderDevice": null, "content": "hi"}
        ]}"#;

        let history: History = serde_json::from_str(raw).unwrap();

        assert_eq!(history.next_id, 0);
        assert_eq!(history.receive.len(), 1);
        assert!(history.file.is_empty());
    }
}
