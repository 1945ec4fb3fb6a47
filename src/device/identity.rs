use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hasher};

use super::user_agent::UserAgentInfo;

/// Information about a connected device, sent with `connect` events
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceMeta {
    pub id: String,
    /// Device class, e.g. "iPhone", "Mac", "Other"
    #[serde(rename = "type")]
    pub device_type: String,
    /// Brand/model string, e.g. "Apple iPhone iOS"
    pub device: String,
    pub os: String,
    pub browser: String,
}

impl DeviceMeta {
    pub fn from_user_agent(id: String, info: &UserAgentInfo) -> Self {
        Self {
            id,
            device_type: info.device_class.clone(),
            device: info.model.clone(),
            os: info.os.clone(),
            browser: info.browser.clone(),
        }
    }
}

/// Derives device IDs from network origin and client descriptor.
///
/// The seed lives for the whole process so IDs are stable across reconnects
/// from the same origin, but not across restarts. IDs are 32-bit and may collide;
/// a later registration simply overwrites the metadata of an earlier one.
#[derive(Debug, Clone, Copy)]
pub struct DeviceIdentifier {
    seed: u64,
}

impl Default for DeviceIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceIdentifier {
    /// Creates an identifier with a random process-lifetime seed
    pub fn new() -> Self {
        Self {
            seed: rand::random(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self { seed }
    }

    /// Hashes `"{remote_addr} {user_agent}"` into a decimal device ID.
    ///
    /// IDs are only stable for one identifier within the running process.
    /// They change with the seed and may change across toolchain versions.
    pub fn device_id(&self, remote_addr: &str, user_agent: &str) -> String {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.seed);
        hasher.write(remote_addr.as_bytes());
        hasher.write_u8(b' ');
        hasher.write(user_agent.as_bytes());

        // Fold to 32 bits, clients expect short numeric IDs
        let hash = hasher.finish();
        ((hash ^ (hash >> 32)) as u32).to_string()
    }
}
