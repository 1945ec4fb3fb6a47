// Public API
pub use broadcast::{BroadcastEngine, BroadcastReport};
pub use handler::push_handler;
pub use messages::{EventName, OutboundEvent};
pub use registry::{ConnectionHandle, ConnectionRegistry, Departed, Recipient, RegistryError};
pub use socket::{OutboundSink, SocketError, WebSocketSink};

// Internal modules
mod broadcast;
mod handler;
mod messages;
mod registry;
mod socket;
