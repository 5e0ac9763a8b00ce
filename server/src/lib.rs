//! Collaboration server library
//!
//! This module exports the server components for use in integration tests
//! and external tooling.

pub mod config;
pub mod coordinator;
pub mod outbox;
pub mod protocol;
pub mod room;
pub mod server;
pub mod subscription;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use protocol::{ClientMessage, ServerMessage};
pub use server::{AppState, router};
