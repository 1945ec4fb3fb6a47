use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument};

use super::models::{Message, Sender, TextMessage};
use crate::room::normalize_room_name;

/// Result of attempting to update a stored text message
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateTextResult {
    /// Content replaced, returns the updated message
    Updated(TextMessage),
    /// Content was identical, nothing changed
    Unchanged(TextMessage),
    /// No text message with that ID in that room
    NotFound,
}

struct LogState {
    next_id: i64,
    entries: VecDeque<Message>,
}

/// Bounded, ID-assigning message store.
///
/// Appends are linearizable under a single lock and IDs are never reused,
/// even after eviction or explicit removal.
pub struct EventLog {
    capacity: usize,
    state: Mutex<LogState>,
}

impl EventLog {
    /// Creates an empty log holding at most `capacity` messages (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(LogState {
                next_id: 1,
                entries: VecDeque::with_capacity(capacity),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().entries.is_empty()
    }

    /// The ID the next auto-assigned message will receive
    pub fn next_id(&self) -> i64 {
        self.state().next_id
    }

    /// Appends a message, assigning an ID when unset, and evicts from the head
    /// until the log is back within capacity. Returns the stored message.
    #[instrument(skip(self, message), fields(room = %message.room()))]
    pub fn append(&self, mut message: Message) -> Message {
        let mut state = self.state();

        if message.id() <= 0 {
            message.set_id(state.next_id);
        }
        state.entries.push_back(message.clone());

        while state.entries.len() > self.capacity {
            if let Some(evicted) = state.entries.pop_front() {
                info!(
                    capacity = self.capacity,
                    id = evicted.id(),
                    room = %evicted.room(),
                    kind = %evicted.kind(),
                    preview = %evicted.preview(),
                    "Event log full, evicted oldest message"
                );
            }
        }

        state.next_id += 1;
        if state.next_id <= message.id() {
            state.next_id = message.id() + 1;
        }

        debug!(id = message.id(), next_id = state.next_id, "Message appended");
        message
    }

    /// Index of the message with `id`, if stored
    pub fn position(&self, id: i64) -> Option<usize> {
        self.state().entries.iter().position(|m| m.id() == id)
    }

    pub fn find_by_id(&self, id: i64) -> Option<Message> {
        self.state().entries.iter().find(|m| m.id() == id).cloned()
    }

    /// Finds a message by ID that is visible from `room`
    pub fn find_in_room(&self, id: i64, room: &str) -> Option<Message> {
        self.state()
            .entries
            .iter()
            .find(|m| m.id() == id && m.visible_in(room))
            .cloned()
    }

    /// Newest message visible from `room`
    pub fn latest(&self, room: &str) -> Option<Message> {
        self.state()
            .entries
            .iter()
            .rev()
            .find(|m| m.visible_in(room))
            .cloned()
    }

    pub fn remove_by_id(&self, id: i64) -> Option<Message> {
        let mut state = self.state();
        let index = state.entries.iter().position(|m| m.id() == id)?;
        state.entries.remove(index)
    }

    pub fn remove_at(&self, index: usize) -> Option<Message> {
        self.state().entries.remove(index)
    }

    /// Removes the message with `id` if it is visible from `room`
    #[instrument(skip(self))]
    pub fn revoke(&self, id: i64, room: &str) -> Option<Message> {
        let mut state = self.state();
        let index = state
            .entries
            .iter()
            .position(|m| m.id() == id && m.visible_in(room))?;
        state.entries.remove(index)
    }

    /// Removes every message whose normalized room equals the normalized `room`.
    /// Returns the removed IDs in log order.
    #[instrument(skip(self))]
    pub fn clear_room(&self, room: &str) -> Vec<i64> {
        let target = normalize_room_name(room);
        let mut state = self.state();
        let mut removed = Vec::new();

        state.entries.retain(|m| {
            if normalize_room_name(m.room()) == target {
                removed.push(m.id());
                false
            } else {
                true
            }
        });

        debug!(room = %target, removed = removed.len(), "Cleared room messages");
        removed
    }

    /// Replaces the content of a text message stored under exactly `room`
    pub fn update_text(&self, id: i64, room: &str, content: &str, sender: Sender) -> UpdateTextResult {
        let mut state = self.state();

        let text = state.entries.iter_mut().find_map(|m| match m {
            Message::Text(text) if text.meta.id == id && text.meta.room == room => Some(text),
            _ => None,
        });

        match text {
            Some(text) if text.content == content => UpdateTextResult::Unchanged(text.clone()),
            Some(text) => {
                text.content = content.to_string();
                text.meta.timestamp = chrono::Utc::now().timestamp();
                text.meta.sender_ip = sender.ip;
                text.meta.sender_device = sender.device;
                UpdateTextResult::Updated(text.clone())
            }
            None => UpdateTextResult::NotFound,
        }
    }

    /// Copy of every message visible from `room` (empty matches all), in log order
    pub fn snapshot(&self, room: &str) -> Vec<Message> {
        self.state()
            .entries
            .iter()
            .filter(|m| m.visible_in(room))
            .cloned()
            .collect()
    }

    /// Full copy of the log plus the next ID, for persistence
    pub fn export(&self) -> (Vec<Message>, i64) {
        let state = self.state();
        (state.entries.iter().cloned().collect(), state.next_id)
    }

    /// Replaces the log content with previously persisted messages.
    ///
    /// Keeps the newest `capacity` entries and moves the next ID past both the
    /// saved counter and every loaded ID.
    pub fn restore(&self, messages: Vec<Message>, saved_next_id: i64) {
        let mut state = self.state();

        let max_id = messages.iter().map(Message::id).max().unwrap_or(0);
        let skip = messages.len().saturating_sub(self.capacity);

        state.entries = messages.into_iter().skip(skip).collect();
        state.next_id = state.next_id.max(saved_next_id).max(max_id + 1);
    }
}
