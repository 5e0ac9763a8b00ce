//! Per-connection outbound queues.
//!
//! Every connection owns one bounded queue drained by its socket writer. Room and subscription
//! fan-out never waits on a queue: a full queue drops the message.

use crate::protocol::{ConnectionId, ServerMessage};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Sending half of a connection's outbound queue
pub type Outbox = mpsc::Sender<ServerMessage>;

/// Create an outbound queue holding at most `capacity` messages
pub fn outbox(capacity: usize) -> (Outbox, mpsc::Receiver<ServerMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Enqueue without waiting. Returns whether the message was accepted.
pub fn try_deliver(outbox: &Outbox, connection_id: ConnectionId, message: ServerMessage) -> bool {
    match outbox.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            counter!("collab_messages_dropped_total", "reason" => "full").increment(1);
            warn!(
                "Outbox of {} is full, dropping {}",
                connection_id,
                message.message_type()
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            counter!("collab_messages_dropped_total", "reason" => "closed").increment(1);
            false
        }
    }
}
