//! Presence tracking: who is in a room, where their cursor is, which slide they look at.

use crate::protocol::{
    ConnectionId, Cursor, ParticipantIdentity, RoomSnapshot, ServerMessage, SlideId,
};
use crate::room::names::{cursor_color, placeholder_name};
use crate::room::state::{Outbound, Room, RoomError, RoomParticipant};
use metrics::histogram;
use tracing::{debug, info};

impl Room {
    /// Register a participant and return the room state it should render.
    ///
    /// The joiner receives `room-state`; everyone else receives `participant-joined`. Joining
    /// again with the same connection only replays the snapshot.
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        identity: ParticipantIdentity,
        now: u64,
    ) -> Result<(RoomSnapshot, Vec<Outbound>), RoomError> {
        if self.participants.contains_key(&connection_id) {
            let snapshot = self.snapshot();
            let outbound = vec![Outbound::only(
                connection_id,
                ServerMessage::RoomState(snapshot.clone()),
            )];
            return Ok((snapshot, outbound));
        }

        if let Some(max) = self.max_participants
            && self.participants.len() >= max
        {
            return Err(RoomError::RoomFull(max));
        }

        let mut identity = identity;
        if identity.display_name.trim().is_empty() {
            identity.display_name = placeholder_name();
        }
        if identity.color.trim().is_empty() {
            identity.color = cursor_color(self.joins).to_string();
        }

        let participant = RoomParticipant {
            connection_id,
            identity,
            cursor: None,
            active_slide: None,
            joined_at: now,
        };
        let announced = participant.to_participant();

        info!(
            "{} ({}) joined room {}",
            announced.display_name, connection_id, self.document_id
        );

        self.participants.insert(connection_id, participant);
        self.joins += 1;
        histogram!("collab_room_participants").record(self.participants.len() as f64);

        let snapshot = self.snapshot();
        let outbound = vec![
            Outbound::only(connection_id, ServerMessage::RoomState(snapshot.clone())),
            Outbound::others(
                connection_id,
                ServerMessage::ParticipantJoined {
                    participant: announced,
                },
            ),
        ];
        Ok((snapshot, outbound))
    }

    /// Move a participant's cursor. Unknown connections are ignored.
    pub fn update_cursor(&mut self, connection_id: ConnectionId, cursor: Cursor) -> Vec<Outbound> {
        let Some(participant) = self.participants.get_mut(&connection_id) else {
            debug!(
                "Ignoring cursor from non-participant {} in {}",
                connection_id, self.document_id
            );
            return Vec::new();
        };

        participant.cursor = Some(cursor);

        vec![Outbound::others(
            connection_id,
            ServerMessage::CursorUpdated {
                connection_id,
                cursor,
            },
        )]
    }

    /// Change the slide a participant is looking at. Unknown connections are ignored.
    pub fn update_active_slide(
        &mut self,
        connection_id: ConnectionId,
        slide_id: SlideId,
    ) -> Vec<Outbound> {
        let Some(participant) = self.participants.get_mut(&connection_id) else {
            debug!(
                "Ignoring slide change from non-participant {} in {}",
                connection_id, self.document_id
            );
            return Vec::new();
        };

        participant.active_slide = Some(slide_id);

        vec![Outbound::others(
            connection_id,
            ServerMessage::ActiveSlideChanged {
                connection_id,
                slide_id,
            },
        )]
    }

    /// Remove a participant and announce the departure to the others.
    ///
    /// Callers release the participant's locks first (see [`Room::depart`]); any lock still
    /// pointing at the departed connection is treated as an invariant violation and dropped.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Vec<Outbound> {
        let Some(removed) = self.participants.shift_remove(&connection_id) else {
            return Vec::new();
        };

        info!(
            "{} ({}) left room {}",
            removed.identity.display_name, connection_id, self.document_id
        );

        let mut outbound: Vec<Outbound> = self
            .heal_orphaned_locks()
            .into_iter()
            .map(|slide_id| {
                Outbound::others(connection_id, ServerMessage::SlideUnlocked { slide_id })
            })
            .collect();
        outbound.push(Outbound::others(
            connection_id,
            ServerMessage::ParticipantLeft {
                connection_id,
                participant: removed.to_participant(),
            },
        ));
        outbound
    }
}
