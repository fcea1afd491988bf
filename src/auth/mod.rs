//! Authentication and session lookup module

pub mod token;
pub mod user;

// Re-export main components
pub use token::{Claims, JwtSessionResolver, SessionResolver, SharedSessionResolver, TokenManager};
pub use user::{Session, UserProfile};
