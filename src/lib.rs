//! Rusty Hub - Real-time connection hub for a workspace chat backend
//!
//! This library provides the WebSocket connection hub that fans events out
//! to workspaces, channels and users, and the token bucket rate limiter
//! guarding the REST surface.

pub mod auth;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
