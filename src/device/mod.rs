// Public API - what other modules can use
pub use identity::{DeviceIdentifier, DeviceMeta};
pub use user_agent::{client_ip, UserAgentInfo};

// Internal modules
mod identity;
mod user_agent;
