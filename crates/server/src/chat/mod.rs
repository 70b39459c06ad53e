//! Chat Service Layer
//!
//! Implements conversations, messaging, and the friend system on top of
//! the shared SQLite store.

pub mod conversation;
pub mod conversations;
pub mod friends;
pub mod handlers;
pub mod messages;

pub use handlers::router;
