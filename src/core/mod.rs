//! Core functionality for the connection hub

pub mod broadcast;
pub mod client_identity;
pub mod connection;
pub mod envelope;
pub mod hub;
pub mod pump;
pub mod rate_limiter;

// Re-export main components for convenience
pub use broadcast::{Broadcaster, SharedBroadcaster};
pub use client_identity::client_identity;
pub use connection::{Connection, ConnectionState, Delivery, OutboundQueue};
pub use envelope::{BroadcastRequest, ChatMessage, ClientFrame, Envelope, Event, PresenceStatus, Scope};
pub use hub::{spawn_hub, Hub, HubHandle, HubStats};
pub use pump::{read_pump, write_pump, PumpSettings};
pub use rate_limiter::{EndpointClass, RateLimitDecision, RateLimiter, SharedRateLimiter};
