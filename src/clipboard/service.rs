use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::types::{ClientInfo, ConnectionError, Session};
use crate::config::{ClientConfig, Config};
use crate::device::{DeviceIdentifier, DeviceMeta, UserAgentInfo};
use crate::message::{
    EventLog, History, HistoryStore, Message, PersistenceError, Sender, StoredFile, TextMessage,
    UpdateTextResult,
};
use crate::room::{build_room_list, normalize_room_name, RoomInfo, RoomListInputs, RoomPresenceTracker, RoomSweeper};
use crate::shared::AppError;
use crate::websockets::{
    BroadcastEngine, BroadcastReport, ConnectionHandle, ConnectionRegistry, Departed,
    OutboundEvent, OutboundSink, SocketError,
};

/// Core of the clipboard server: owns the connection registry, the event log
/// and the room tracker, and keeps them consistent.
///
/// The three components are locked independently and no method holds two of
/// their locks at once. Network writes and history saves happen outside all of them.
pub struct ClipboardService {
    registry: Arc<ConnectionRegistry>,
    engine: BroadcastEngine,
    log: EventLog,
    tracker: RoomPresenceTracker,
    store: Arc<dyn HistoryStore>,
    // uuid -> uploaded file
    stored_files: Mutex<HashMap<String, StoredFile>>,
    identifier: DeviceIdentifier,
    client_config: ClientConfig,
    text_limit: u64,
    // Serializes history writes
    save_lock: tokio::sync::Mutex<()>,
}

impl ClipboardService {
    pub fn new(config: &Config, store: Arc<dyn HistoryStore>) -> Self {
        Self::with_identifier(config, store, DeviceIdentifier::new())
    }

    pub fn with_identifier(config: &Config, store: Arc<dyn HistoryStore>, identifier: DeviceIdentifier) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            engine: BroadcastEngine::new(registry.clone()),
            registry,
            log: EventLog::new(config.server.history),
            tracker: RoomPresenceTracker::new(),
            store,
            stored_files: Mutex::new(HashMap::new()),
            identifier,
            client_config: config.client_config(),
            text_limit: config.text.limit,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, StoredFile>> {
        self.stored_files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn tracker(&self) -> &RoomPresenceTracker {
        &self.tracker
    }

    /// Device ID and metadata a client will be known under
    pub fn identify(&self, client: &ClientInfo) -> DeviceMeta {
        let device_id = self
            .identifier
            .device_id(&client.remote_addr, &client.user_agent);
        DeviceMeta::from_user_agent(device_id, &UserAgentInfo::parse(&client.user_agent))
    }

    /// Registers a freshly upgraded connection and brings it up to date.
    ///
    /// The new connection receives one `connect` per device already in the room,
    /// the room's history and the client config; the other members receive a
    /// `connect` for the new device. If the peer sync or the history replay
    /// cannot be written, the connection is unregistered again.
    #[instrument(skip(self, sink, client), fields(remote_addr = %client.remote_addr))]
    pub async fn register_connection(
        &self,
        sink: Arc<dyn OutboundSink>,
        room: &str,
        client: &ClientInfo,
    ) -> Result<Session, ConnectionError> {
        let room = normalize_room_name(room).to_string();
        let meta = self.identify(client);
        let device_id = meta.id.clone();

        let handle = self.registry.accept(sink.clone(), client.remote_addr.clone());
        let peers = match self.registry.register(handle, &room, &device_id, meta.clone()) {
            Ok(peers) => peers,
            Err(e) => {
                self.registry.unregister(handle);
                return Err(e.into());
            }
        };
        self.tracker.record_device_state(&room, &device_id, true);

        info!(
            room_id = %room,
            device_id = %device_id,
            connections = self.registry.connection_count(),
            "Client connected"
        );

        let session = Session {
            handle,
            device_id,
            room,
        };

        for peer in &peers {
            if let Err(e) = send_direct(sink.as_ref(), &OutboundEvent::connect(peer)).await {
                warn!(device_id = %session.device_id, error = %e, "Failed to send peer list");
                self.unregister_connection(handle).await;
                return Err(e.into());
            }
        }

        self.broadcast(&OutboundEvent::connect(&meta), &session.room, Some(handle))
            .await;

        let history = self.log.snapshot(&session.room);
        for message in &history {
            if let Err(e) = send_direct(sink.as_ref(), &OutboundEvent::receive(message)).await {
                warn!(device_id = %session.device_id, error = %e, "Failed to replay history");
                self.unregister_connection(handle).await;
                return Err(e.into());
            }
        }
        debug!(replayed = history.len(), "History replayed");

        if let Err(e) = send_direct(sink.as_ref(), &OutboundEvent::config(&self.client_config)).await {
            warn!(device_id = %session.device_id, error = %e, "Failed to send client config");
        }

        Ok(session)
    }

    /// Removes a connection, closes it and tells the room its device left.
    /// Returns the removed device ID; None if the connection was already gone.
    #[instrument(skip(self, handle), fields(handle = %handle))]
    pub async fn unregister_connection(&self, handle: ConnectionHandle) -> Option<String> {
        let departed = self.registry.unregister(handle)?;
        departed.sink.close().await;

        let (Some(room), Some(device_id)) = (departed.room, departed.device_id) else {
            debug!(remote_addr = %departed.remote_addr, "Unregistered connection without device");
            return None;
        };

        self.tracker.record_device_state(&room, &device_id, false);
        info!(
            room_id = %room,
            device_id = %device_id,
            connections = self.registry.connection_count(),
            "Client disconnected"
        );

        self.broadcast(&OutboundEvent::disconnect(&device_id), &room, None)
            .await;
        Some(device_id)
    }

    /// Fans `event` out to `room` (empty means every connection).
    ///
    /// Connections whose write failed are dropped from the room stats and their
    /// room is sent a `disconnect`. Those follow-up broadcasts can reap more
    /// connections, so they are drained from a queue until none are left.
    pub async fn broadcast(
        &self,
        event: &OutboundEvent,
        room: &str,
        exclude: Option<ConnectionHandle>,
    ) -> BroadcastReport {
        let report = self.engine.broadcast(event, room, exclude).await;

        let mut departed = VecDeque::new();
        self.record_reaped(&report.reaped, &mut departed);
        while let Some((room, device_id)) = departed.pop_front() {
            let follow_up = self
                .engine
                .broadcast(&OutboundEvent::disconnect(&device_id), &room, None)
                .await;
            self.record_reaped(&follow_up.reaped, &mut departed);
        }

        report
    }

    fn record_reaped(&self, reaped: &[Departed], departed: &mut VecDeque<(String, String)>) {
        for connection in reaped {
            if let (Some(room), Some(device_id)) = (&connection.room, &connection.device_id) {
                self.tracker.record_device_state(room, device_id, false);
                info!(room_id = %room, device_id = %device_id, "Dropped unreachable client");
                departed.push_back((room.clone(), device_id.clone()));
            }
        }
    }

    /// Stores a message under its normalized room, broadcasts it to that room
    /// and saves the history. Returns the stored message with its assigned ID.
    #[instrument(skip(self, message), fields(room_id = %message.room(), kind = %message.kind()))]
    pub async fn append_message(&self, mut message: Message) -> Message {
        let room = normalize_room_name(message.room()).to_string();
        message.meta_mut().room = room;
        let stored = self.log.append(message);
        self.tracker.record_message(stored.room(), 1);

        info!(id = stored.id(), preview = %stored.preview(), "Message stored");

        self.broadcast(&OutboundEvent::receive(&stored), stored.room(), None)
            .await;
        self.persist().await;
        stored
    }

    /// Appends a text message after checking the configured size limit
    pub async fn submit_text(&self, room: &str, content: &str, sender: Sender) -> Result<Message, AppError> {
        if self.text_limit > 0 && content.len() as u64 > self.text_limit {
            return Err(AppError::PayloadTooLarge(format!(
                "Text exceeds the limit of {} bytes",
                self.text_limit
            )));
        }
        Ok(self.append_message(Message::text(room, content, sender)).await)
    }

    /// Replaces the content of a text message stored in exactly the normalized `room`.
    /// Identical content is accepted without broadcasting or saving.
    #[instrument(skip(self, content, sender))]
    pub async fn update_text(
        &self,
        id: i64,
        room: &str,
        content: &str,
        sender: Sender,
    ) -> Result<TextMessage, AppError> {
        let room = normalize_room_name(room);
        match self.log.update_text(id, room, content, sender) {
            UpdateTextResult::Updated(text) => {
                info!(id, "Text message updated");
                self.broadcast(&OutboundEvent::update(&text), room, None).await;
                self.persist().await;
                Ok(text)
            }
            UpdateTextResult::Unchanged(text) => {
                debug!(id, "Text message unchanged");
                Ok(text)
            }
            UpdateTextResult::NotFound => Err(AppError::NotFound(format!("Text message {} not found", id))),
        }
    }

    /// Removes a message visible from `room` and tells `room` about it
    #[instrument(skip(self))]
    pub async fn revoke_message(&self, id: i64, room: &str) -> Result<Message, AppError> {
        let revoked = self.log.revoke(id, room).ok_or_else(|| {
            debug!(id, room_id = %room, "Revoke target not found");
            AppError::NotFound(format!("Message {} not found", id))
        })?;

        if let Message::File(file) = &revoked {
            self.files().remove(&file.cache);
        }
        info!(id, kind = %revoked.kind(), "Message revoked");

        self.broadcast(&OutboundEvent::revoke(id), room, None).await;
        self.persist().await;
        Ok(revoked)
    }

    /// Removes every message of the normalized room. An empty `room` also drops
    /// the whole stored-file index and notifies every connection.
    #[instrument(skip(self))]
    pub async fn clear_room(&self, room: &str) -> Vec<i64> {
        let removed = self.log.clear_room(room);
        if room.is_empty() {
            self.files().clear();
        }
        info!(removed = removed.len(), "Room cleared");

        self.broadcast(&OutboundEvent::clear_all(room), room, None).await;
        self.persist().await;
        removed
    }

    pub fn find_message(&self, id: i64, room: &str) -> Option<Message> {
        self.log.find_in_room(id, room)
    }

    pub fn latest_message(&self, room: &str) -> Option<Message> {
        self.log.latest(room)
    }

    /// Records an uploaded file so its message survives a restart
    pub fn register_stored_file(&self, file: StoredFile) {
        debug!(uuid = %file.uuid, name = %file.name, "Stored file registered");
        self.files().insert(file.uuid.clone(), file);
    }

    pub fn stored_file(&self, uuid: &str) -> Option<StoredFile> {
        self.files().get(uuid).cloned()
    }

    /// Merges registry, log and tracker snapshots into the room listing
    pub fn room_list(&self) -> Vec<RoomInfo> {
        let room_devices = self.registry.room_devices();

        let mut stored_messages: HashMap<String, u64> = HashMap::new();
        for message in self.log.snapshot("") {
            *stored_messages
                .entry(normalize_room_name(message.room()).to_string())
                .or_default() += 1;
        }

        let stats = self.tracker.snapshot();

        build_room_list(
            RoomListInputs {
                room_devices,
                stored_messages,
                stats,
            },
            chrono::Utc::now().timestamp(),
        )
    }

    /// Saves the log and the stored-file index. Failures are logged, never returned.
    pub async fn persist(&self) {
        let _guard = self.save_lock.lock().await;

        let (receive, next_id) = self.log.export();
        let file = self.files().values().cloned().collect();
        let history = History {
            file,
            receive,
            next_id,
        };

        if let Err(e) = self.store.save(&history).await {
            warn!(error = %e, "Failed to save history");
        }
    }

    /// Restores the history saved by a previous run.
    ///
    /// File messages whose stored file is unknown or expired are dropped and
    /// rooms are normalized.
    /// Returns the number of restored messages.
    #[instrument(skip(self))]
    pub async fn load_history(&self) -> Result<usize, PersistenceError> {
        let Some(history) = self.store.load().await? else {
            return Ok(0);
        };

        let now = chrono::Utc::now().timestamp();
        let files: HashMap<String, StoredFile> = history
            .file
            .into_iter()
            .filter(|f| f.expire_time >= now)
            .map(|f| (f.uuid.clone(), f))
            .collect();

        let messages: Vec<Message> = history
            .receive
            .into_iter()
            .filter(|message| match message {
                Message::File(file) => {
                    let keep = files.contains_key(&file.cache);
                    if !keep {
                        debug!(id = file.meta.id, name = %file.name, "Dropping file message without stored file");
                    }
                    keep
                }
                Message::Text(_) => true,
            })
            .map(|mut message| {
                let room = normalize_room_name(message.room()).to_string();
                message.meta_mut().room = room;
                message
            })
            .collect();

        self.log.restore(messages, history.next_id);
        *self.files() = files;

        let restored = self.log.snapshot("");
        for message in &restored {
            self.tracker
                .record_message_at(message.room(), 1, message.timestamp());
        }

        info!(
            messages = restored.len(),
            next_id = self.log.next_id(),
            "History restored"
        );
        Ok(restored.len())
    }

    /// Closes every connection and saves the history one last time
    pub async fn shutdown(&self) {
        let departed = self.registry.drain();
        info!(connections = departed.len(), "Closing connections");
        for connection in departed {
            connection.sink.close().await;
        }
        self.persist().await;
    }
}

impl RoomSweeper for ClipboardService {
    fn sweep_idle_rooms(&self, inactivity_threshold: Duration) -> Vec<String> {
        let mut occupied: HashSet<String> = self.registry.occupied_rooms();
        occupied.extend(
            self.log
                .snapshot("")
                .iter()
                .map(|m| normalize_room_name(m.room()).to_string()),
        );
        self.tracker.cleanup(inactivity_threshold, &occupied)
    }
}

async fn send_direct(sink: &dyn OutboundSink, event: &OutboundEvent) -> Result<(), SocketError> {
    let frame = event
        .to_frame()
        .map_err(|e| SocketError::SendFailed(e.to_string()))?;
    sink.send_text(frame).await
}
