use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, instrument};

use super::socket::OutboundSink;
use crate::device::DeviceMeta;
use crate::room::normalize_room_name;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown connection {0}")]
    UnknownConnection(ConnectionHandle),

    #[error("Connection {0} is already registered to a room")]
    AlreadyRegistered(ConnectionHandle),
}

/// Opaque, generation-stamped key for a live connection.
///
/// A slot index is reused after its connection is removed, the generation
/// is not, so a stale handle never addresses a newer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

/// A connection selected by a snapshot: its handle plus the transport to write to
#[derive(Clone)]
pub struct Recipient {
    pub handle: ConnectionHandle,
    pub sink: Arc<dyn OutboundSink>,
}

/// Everything removed from the registry for one connection
pub struct Departed {
    pub handle: ConnectionHandle,
    pub remote_addr: String,
    /// None when the connection never completed registration
    pub room: Option<String>,
    pub device_id: Option<String>,
    pub sink: Arc<dyn OutboundSink>,
}

struct Transport {
    sink: Arc<dyn OutboundSink>,
    remote_addr: String,
}

struct Slot {
    generation: u32,
    transport: Option<Transport>,
}

#[derive(Default)]
struct RegistryState {
    // Owned transports, addressed by handle
    slots: Vec<Slot>,
    free: Vec<u32>,
    // handle -> normalized room
    rooms: HashMap<ConnectionHandle, String>,
    // handle -> device ID
    connection_devices: HashMap<ConnectionHandle, String>,
    // device ID -> metadata, shared by every connection with that ID
    devices: HashMap<String, DeviceMeta>,
}

impl RegistryState {
    fn transport(&self, handle: ConnectionHandle) -> Option<&Transport> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.transport.as_ref())
    }

    fn device_ids_in_room(&self, room: &str, exclude_device: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rooms
            .iter()
            .filter(|(_, r)| r.as_str() == room)
            .filter_map(|(handle, _)| self.connection_devices.get(handle))
            .filter(|id| id.as_str() != exclude_device && seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    fn remove(&mut self, handle: ConnectionHandle) -> Option<Departed> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let transport = slot.transport.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);

        let room = self.rooms.remove(&handle);
        let device_id = self.connection_devices.remove(&handle);
        if let Some(device_id) = &device_id {
            // Removed even if a sibling connection shares the ID
            self.devices.remove(device_id);
        }

        Some(Departed {
            handle,
            remote_addr: transport.remote_addr,
            room,
            device_id,
            sink: transport.sink,
        })
    }
}

/// Thread-safe bookkeeping of live connections, their room and device identity.
///
/// Every operation takes the one internal lock and never performs I/O while holding it.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes ownership of a freshly accepted transport and issues its handle
    pub fn accept(&self, sink: Arc<dyn OutboundSink>, remote_addr: impl Into<String>) -> ConnectionHandle {
        let mut state = self.state();
        let transport = Transport {
            sink,
            remote_addr: remote_addr.into(),
        };

        if let Some(index) = state.free.pop() {
            let slot = &mut state.slots[index as usize];
            slot.transport = Some(transport);
            return ConnectionHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = state.slots.len() as u32;
        state.slots.push(Slot {
            generation: 0,
            transport: Some(transport),
        });
        ConnectionHandle {
            index,
            generation: 0,
        }
    }

    /// Places an accepted connection in `room` under `device_id`.
    ///
    /// Later registrations overwrite the metadata of a colliding device ID.
    /// Returns the metadata of the other devices already in the room.
    #[instrument(skip(self, handle, meta), fields(handle = %handle))]
    pub fn register(
        &self,
        handle: ConnectionHandle,
        room: &str,
        device_id: &str,
        meta: DeviceMeta,
    ) -> Result<Vec<DeviceMeta>, RegistryError> {
        let room = normalize_room_name(room);
        let mut state = self.state();

        if state.transport(handle).is_none() {
            return Err(RegistryError::UnknownConnection(handle));
        }
        if state.rooms.contains_key(&handle) {
            return Err(RegistryError::AlreadyRegistered(handle));
        }

        state.rooms.insert(handle, room.to_string());
        state.connection_devices.insert(handle, device_id.to_string());
        state.devices.insert(device_id.to_string(), meta);

        let peers = state
            .device_ids_in_room(room, device_id)
            .into_iter()
            .filter_map(|id| state.devices.get(&id).cloned())
            .collect();

        debug!(
            room_id = %room,
            device_id = %device_id,
            connections = state.rooms.len(),
            devices = state.devices.len(),
            "Connection registered"
        );
        Ok(peers)
    }

    /// Removes every entry keyed by `handle`. A second call is a no-op returning None.
    pub fn unregister(&self, handle: ConnectionHandle) -> Option<Departed> {
        self.state().remove(handle)
    }

    /// Removes failed connections in one locked pass. Closing them is up to the caller.
    pub fn reap(&self, handles: &[ConnectionHandle]) -> Vec<Departed> {
        let mut state = self.state();
        handles.iter().filter_map(|h| state.remove(*h)).collect()
    }

    /// Device IDs present in `room` other than `exclude_device`
    pub fn devices_in_room(&self, room: &str, exclude_device: &str) -> Vec<String> {
        self.state()
            .device_ids_in_room(normalize_room_name(room), exclude_device)
    }

    /// Copies the registered connections in `room` (empty matches all), optionally excluding one
    pub fn snapshot(&self, room: &str, exclude: Option<ConnectionHandle>) -> Vec<Recipient> {
        let state = self.state();
        state
            .rooms
            .iter()
            .filter(|(handle, r)| {
                Some(**handle) != exclude && (room.is_empty() || r.as_str() == room)
            })
            .filter_map(|(handle, _)| {
                state.transport(*handle).map(|t| Recipient {
                    handle: *handle,
                    sink: t.sink.clone(),
                })
            })
            .collect()
    }

    /// Transport of one connection, for direct writes
    pub fn sink(&self, handle: ConnectionHandle) -> Option<Arc<dyn OutboundSink>> {
        self.state().transport(handle).map(|t| t.sink.clone())
    }

    pub fn room_of(&self, handle: ConnectionHandle) -> Option<String> {
        self.state().rooms.get(&handle).cloned()
    }

    pub fn device_meta(&self, device_id: &str) -> Option<DeviceMeta> {
        self.state().devices.get(device_id).cloned()
    }

    /// Device IDs of the live connections, grouped by room
    pub fn room_devices(&self) -> HashMap<String, HashSet<String>> {
        let state = self.state();
        let mut rooms: HashMap<String, HashSet<String>> = HashMap::new();
        for (handle, room) in &state.rooms {
            if let Some(device_id) = state.connection_devices.get(handle) {
                rooms
                    .entry(room.clone())
                    .or_default()
                    .insert(device_id.clone());
            }
        }
        rooms
    }

    /// Rooms with at least one registered connection
    pub fn occupied_rooms(&self) -> HashSet<String> {
        self.state().rooms.values().cloned().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.state().rooms.len()
    }

    pub fn device_count(&self) -> usize {
        self.state().devices.len()
    }

    /// Removes every connection, registered or not, for shutdown
    pub fn drain(&self) -> Vec<Departed> {
        let mut state = self.state();
        let live: Vec<ConnectionHandle> = state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.transport.is_some())
            .map(|(index, slot)| ConnectionHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();
        live.into_iter().filter_map(|h| state.remove(h)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websockets::socket::SocketError;
    use async_trait::async_trait;

    struct NullSink;

    #[async_trait]
    impl OutboundSink for NullSink {
        async fn send_text(&self, _frame: String) -> Result<(), SocketError> {
            Ok(())
        }

        async fn close(&self) {}
    }

    fn meta(id: &str) -> DeviceMeta {
        DeviceMeta {
            id: id.to_string(),
            device_type: "Other".to_string(),
            ..Default::default()
        }
    }

    fn connect(registry: &ConnectionRegistry, room: &str, device: &str) -> ConnectionHandle {
        let handle = registry.accept(Arc::new(NullSink), "127.0.0.1:1000");
        registry.register(handle, room, device, meta(device)).unwrap();
        handle
    }

    #[test]
    fn test_register_returns_other_devices_in_room() {
        let registry = ConnectionRegistry::new();
        connect(&registry, "x", "d1");
        connect(&registry, "y", "d3");

        let handle = registry.accept(Arc::new(NullSink), "127.0.0.1:2000");
        let peers = registry.register(handle, "x", "d2", meta("d2")).unwrap();

        assert_eq!(peers, vec![meta("d1")]);
        assert_eq!(registry.devices_in_room("x", "d2"), vec!["d1".to_string()]);
    }

    #[test]
    fn test_empty_room_registers_as_default() {
        let registry = ConnectionRegistry::new();
        let handle = connect(&registry, "", "d1");

        assert_eq!(registry.room_of(handle).as_deref(), Some("default"));
        assert_eq!(registry.devices_in_room("", "other"), vec!["d1".to_string()]);
    }

    #[test]
    fn test_room_is_fixed_after_registration() {
        let registry = ConnectionRegistry::new();
        let handle = connect(&registry, "x", "d1");

        let result = registry.register(handle, "y", "d1", meta("d1"));

        assert_eq!(result, Err(RegistryError::AlreadyRegistered(handle)));
        assert_eq!(registry.room_of(handle).as_deref(), Some("x"));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let handle = connect(&registry, "x", "d1");
        let other = connect(&registry, "x", "d2");

        let departed = registry.unregister(handle).unwrap();
        assert_eq!(departed.device_id.as_deref(), Some("d1"));
        assert_eq!(departed.room.as_deref(), Some("x"));

        assert!(registry.unregister(handle).is_none());
        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.device_meta("d2"), Some(meta("d2")));
        assert_eq!(registry.room_of(other).as_deref(), Some("x"));
    }

    #[test]
    fn test_stale_handle_does_not_reach_reused_slot() {
        let registry = ConnectionRegistry::new();
        let old = connect(&registry, "x", "d1");
        registry.unregister(old);

        let new = connect(&registry, "x", "d2");

        assert_ne!(old, new);
        assert!(registry.unregister(old).is_none());
        assert!(registry.sink(new).is_some());
        assert_eq!(
            registry.register(old, "x", "d1", meta("d1")),
            Err(RegistryError::UnknownConnection(old))
        );
    }

    #[test]
    fn test_snapshot_filters_by_room_and_exclusion() {
        let registry = ConnectionRegistry::new();
        let a = connect(&registry, "x", "d1");
        let b = connect(&registry, "x", "d2");
        let c = connect(&registry, "y", "d3");

        let mut in_x: Vec<_> = registry.snapshot("x", None).iter().map(|r| r.handle).collect();
        in_x.sort_by_key(|h| h.index);
        assert_eq!(in_x, vec![a, b]);

        let without_a: Vec<_> = registry.snapshot("x", Some(a)).iter().map(|r| r.handle).collect();
        assert_eq!(without_a, vec![b]);

        assert_eq!(registry.snapshot("", None).len(), 3);
        assert_eq!(registry.snapshot("y", None)[0].handle, c);
    }

    #[test]
    fn test_shared_device_id_metadata_removed_by_either_disconnect() {
        let registry = ConnectionRegistry::new();
        let first = connect(&registry, "x", "same");
        let _second = connect(&registry, "x", "same");

        registry.unregister(first);

        assert_eq!(registry.connection_count(), 1);
        assert!(registry.device_meta("same").is_none());
    }

    #[test]
    fn test_room_devices_and_drain() {
        let registry = ConnectionRegistry::new();
        connect(&registry, "x", "d1");
        connect(&registry, "x", "d2");
        registry.accept(Arc::new(NullSink), "127.0.0.1:3000");

        let rooms = registry.room_devices();
        assert_eq!(rooms["x"].len(), 2);

        let drained = registry.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.device_count(), 0);
    }
}
