// Public API - what other modules can use
pub use event_log::{EventLog, UpdateTextResult};
pub use models::{FileMessage, Message, MessageKind, MessageMeta, Sender, SenderDevice, TextMessage};
pub use persistence::{
    History, HistoryStore, InMemoryHistoryStore, JsonFileHistoryStore, PersistenceError,
    StoredFile,
};

// Internal modules
mod event_log;
mod models;
mod persistence;
