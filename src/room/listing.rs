use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::tracker::RoomStat;
use super::types::{display_room_name, RoomInfo};

/// Independent snapshots the room listing is merged from, all keyed by normalized room name
#[derive(Debug, Default)]
pub struct RoomListInputs {
    /// Devices of the live connections, from the connection registry
    pub room_devices: HashMap<String, HashSet<String>>,
    /// Messages currently held by the event log
    pub stored_messages: HashMap<String, u64>,
    /// Aggregates from the presence tracker
    pub stats: HashMap<String, RoomStat>,
}

/// Merges the snapshots into the listing: active rooms first, then by last activity, newest first.
/// Rooms with live devices report `now` as their last activity.
pub fn build_room_list(inputs: RoomListInputs, now: i64) -> Vec<RoomInfo> {
    let RoomListInputs {
        room_devices,
        stored_messages,
        stats,
    } = inputs;

    let names: BTreeSet<&String> = room_devices
        .keys()
        .chain(stored_messages.keys())
        .chain(stats.keys())
        .collect();

    let mut rooms: Vec<RoomInfo> = names
        .into_iter()
        .map(|room| {
            let device_count = room_devices.get(room).map_or(0, HashSet::len);
            let stored = stored_messages.get(room).copied().unwrap_or(0);
            let stat = stats.get(room);

            let is_active = device_count > 0;
            let last_active = if is_active {
                now
            } else {
                stat.map_or(0, |s| s.last_active)
            };

            RoomInfo {
                name: display_room_name(room).to_string(),
                message_count: stat.map_or(0, |s| s.message_count).max(stored),
                device_count,
                last_active,
                is_active,
            }
        })
        .collect();

    rooms.sort_by_key(|info| (Reverse(info.is_active), Reverse(info.last_active)));
    rooms
}
