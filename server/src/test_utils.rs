//! Test Utilities Module
//!
//! Fixtures shared by the unit tests. Only compiled when running tests.

use crate::outbox::{Outbox, outbox};
use crate::protocol::{ParticipantIdentity, ServerMessage, UserId};
use tokio::sync::mpsc;

/// Outbox capacity used in tests; large enough that nothing is ever dropped
pub const TEST_OUTBOX_CAPACITY: usize = 1024;

/// Identity with a fixed color so assertions stay deterministic
pub fn identity(user_id: &str, display_name: &str) -> ParticipantIdentity {
    ParticipantIdentity {
        user_id: UserId::from(user_id),
        display_name: display_name.to_string(),
        color: "#10B981".to_string(),
    }
}

/// Fresh outbox and its receiving end
pub fn test_outbox() -> (Outbox, mpsc::Receiver<ServerMessage>) {
    outbox(TEST_OUTBOX_CAPACITY)
}

/// Everything currently queued on a receiver, in order
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        messages.push(msg);
    }
    messages
}
