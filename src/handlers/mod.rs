//! Request handlers for different server endpoints

pub mod auth;
pub mod rate_limit;
pub mod rejection;
pub mod routes;
pub mod websocket;

// Re-export the entry points used by the server binary
pub use rate_limit::{rate_limit, with_rate_limit_headers, RateLimited};
pub use rejection::handle_rejection;
pub use routes::{routes, ServerState};
pub use websocket::handle_ws_client;
