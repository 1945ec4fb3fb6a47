use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::types::{normalize_room_name, DEFAULT_ROOM};

/// Aggregate statistics of one room
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomStat {
    /// Messages ever posted to the room; eviction does not decrement it
    pub message_count: u64,
    /// Unix timestamp of the last message or presence change
    pub last_active: i64,
    /// Devices currently connected to the room
    pub device_ids: HashSet<String>,
}

/// Per-room statistics, keyed by normalized room name.
///
/// Independent from the connection registry: it only learns about devices
/// through `record_device_state`.
#[derive(Default)]
pub struct RoomPresenceTracker {
    rooms: RwLock<HashMap<String, RoomStat>>,
}

impl RoomPresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RoomStat>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RoomStat>> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `delta` posted messages to the room and marks it active now
    pub fn record_message(&self, room: &str, delta: u64) {
        self.record_message_at(room, delta, now());
    }

    pub fn record_message_at(&self, room: &str, delta: u64, timestamp: i64) {
        let room = normalize_room_name(room);
        let mut rooms = self.write();
        let stat = rooms.entry(room.to_string()).or_default();
        stat.message_count = stat.message_count.saturating_add(delta);
        stat.last_active = timestamp;
    }

    /// Adds or removes a device from the room's live set and marks the room active now
    pub fn record_device_state(&self, room: &str, device_id: &str, connected: bool) {
        self.record_device_state_at(room, device_id, connected, now());
    }

    pub fn record_device_state_at(&self, room: &str, device_id: &str, connected: bool, timestamp: i64) {
        let room = normalize_room_name(room);
        let mut rooms = self.write();
        let stat = rooms.entry(room.to_string()).or_default();
        if connected {
            stat.device_ids.insert(device_id.to_string());
        } else {
            stat.device_ids.remove(device_id);
        }
        stat.last_active = timestamp;
        debug!(room_id = %room, device_id = %device_id, connected, "Room presence updated");
    }

    pub fn get(&self, room: &str) -> Option<RoomStat> {
        self.read().get(normalize_room_name(room)).cloned()
    }

    /// Copy of every room's statistics
    pub fn snapshot(&self) -> HashMap<String, RoomStat> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes idle rooms, see `cleanup_at`
    pub fn cleanup(&self, idle_threshold: Duration, occupied: &HashSet<String>) -> Vec<String> {
        self.cleanup_at(idle_threshold, occupied, now())
    }

    /// Removes the stats of every room that has no live device, is not listed in
    /// `occupied` (normalized names of rooms with connections or stored messages)
    /// and has been idle for longer than `idle_threshold`.
    /// The default room is never removed. Returns the removed room names.
    ///
    /// Only messages still stored keep a room alive: the cumulative
    /// `message_count` is reporting data and is ignored here.
    #[instrument(skip(self, occupied))]
    pub fn cleanup_at(
        &self,
        idle_threshold: Duration,
        occupied: &HashSet<String>,
        now: i64,
    ) -> Vec<String> {
        let threshold = i64::try_from(idle_threshold.as_secs()).unwrap_or(i64::MAX);
        let mut rooms = self.write();

        let idle: Vec<String> = rooms
            .iter()
            .filter(|(room, stat)| {
                room.as_str() != DEFAULT_ROOM
                    && !occupied.contains(room.as_str())
                    && stat.device_ids.is_empty()
                    && now.saturating_sub(stat.last_active) > threshold
            })
            .map(|(room, _)| room.clone())
            .collect();

        for room in &idle {
            rooms.remove(room);
            info!(room_id = %room, "Removed idle room stats");
        }

        idle
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
