//! Content relay and room chat.

use crate::protocol::{ConnectionId, ServerMessage, SlideId};
use crate::room::state::{Outbound, Room, RoomError};
use metrics::counter;
use serde_json::Value;
use tracing::debug;

/// Result of a content update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Relayed,
    Rejected(RoomError),
}

impl Room {
    /// Relay a slide update from the lock holder to everyone else.
    ///
    /// Updates from a connection that does not hold the slide lock are answered with
    /// `sync-rejected` to the sender only, and the cached content stays untouched.
    pub fn relay_update(
        &mut self,
        connection_id: ConnectionId,
        slide_id: SlideId,
        payload: Value,
        op_metadata: Option<Value>,
    ) -> (RelayOutcome, Vec<Outbound>) {
        if self.locks.holder(slide_id) != Some(connection_id) {
            let reason = if self.is_participant(connection_id) {
                RoomError::NoLockHeld
            } else {
                RoomError::NotJoined
            };
            return reject_sync(connection_id, slide_id, reason);
        }

        self.last_content.insert(slide_id, payload.clone());

        debug!(
            "Relaying update of slide {} in {} from {}",
            slide_id, self.document_id, connection_id
        );

        (
            RelayOutcome::Relayed,
            vec![Outbound::others(
                connection_id,
                ServerMessage::SlideSynced {
                    slide_id,
                    payload,
                    op_metadata,
                    author_connection_id: connection_id,
                },
            )],
        )
    }

    /// Broadcast a chat message to the whole room, author included.
    ///
    /// Chat does not need any lock. Messages from non-participants are dropped.
    pub fn chat(&self, connection_id: ConnectionId, text: String, now: u64) -> Vec<Outbound> {
        let Some(author) = self.participant(connection_id) else {
            debug!(
                "Dropping chat from non-participant {} in {}",
                connection_id, self.document_id
            );
            return Vec::new();
        };

        vec![Outbound::all(ServerMessage::ChatMessage {
            connection_id,
            participant: author.to_participant(),
            text,
            timestamp: now,
        })]
    }
}

pub(crate) fn reject_sync(
    connection_id: ConnectionId,
    slide_id: SlideId,
    reason: RoomError,
) -> (RelayOutcome, Vec<Outbound>) {
    counter!("collab_sync_rejected_total").increment(1);
    let outbound = vec![Outbound::only(
        connection_id,
        ServerMessage::SyncRejected {
            slide_id,
            reason: reason.to_string(),
        },
    )];
    (RelayOutcome::Rejected(reason), outbound)
}
