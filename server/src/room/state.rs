use crate::protocol::{
    ConnectionId, Cursor, DocumentId, LockEntry, Participant, ParticipantIdentity, RoomSnapshot,
    ServerMessage, SlideContent, SlideId,
};
use crate::room::locks::LockTable;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::error;

/// Reasons a room operation is refused.
///
/// The `Display` text is sent verbatim to clients as the denial reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("Not a participant of this room")]
    NotJoined,

    #[error("Slide is being edited by {0}")]
    LockedBy(String),

    #[error("No lock held")]
    NoLockHeld,

    #[error("Room is full (max {0} participants)")]
    RoomFull(usize),
}

/// Who receives an outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    /// Exactly one connection
    Only(ConnectionId),
    /// Every member except one connection
    AllExcept(ConnectionId),
    /// Every member
    All,
}

impl Recipients {
    pub fn includes(&self, connection_id: ConnectionId) -> bool {
        match self {
            Recipients::Only(id) => *id == connection_id,
            Recipients::AllExcept(id) => *id != connection_id,
            Recipients::All => true,
        }
    }
}

/// A message produced by a room transition, not yet delivered
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Recipients,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn only(connection_id: ConnectionId, message: ServerMessage) -> Self {
        Self {
            to: Recipients::Only(connection_id),
            message,
        }
    }

    pub fn others(connection_id: ConnectionId, message: ServerMessage) -> Self {
        Self {
            to: Recipients::AllExcept(connection_id),
            message,
        }
    }

    pub fn all(message: ServerMessage) -> Self {
        Self {
            to: Recipients::All,
            message,
        }
    }
}

/// Participant within a room (extended data)
#[derive(Debug, Clone)]
pub struct RoomParticipant {
    pub connection_id: ConnectionId,
    pub identity: ParticipantIdentity,
    pub cursor: Option<Cursor>,
    pub active_slide: Option<SlideId>,
    pub joined_at: u64,
}

impl RoomParticipant {
    pub fn to_participant(&self) -> Participant {
        Participant {
            connection_id: self.connection_id,
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.display_name.clone(),
            color: self.identity.color.clone(),
            cursor: self.cursor,
            active_slide: self.active_slide,
            joined_at: self.joined_at,
        }
    }
}

/// Ephemeral collaboration state of one document.
///
/// All transitions are synchronous and return the messages they produce; delivering them is
/// the caller's job. Presence, lock and relay transitions live in the sibling modules.
#[derive(Debug)]
pub struct Room {
    pub(crate) document_id: DocumentId,
    pub(crate) participants: IndexMap<ConnectionId, RoomParticipant>,
    pub(crate) locks: LockTable,
    pub(crate) last_content: BTreeMap<SlideId, Value>,
    pub(crate) max_participants: Option<usize>,
    /// Join counter, used to cycle the color palette
    pub(crate) joins: usize,
}

impl Room {
    pub fn new(document_id: impl Into<DocumentId>) -> Self {
        Self {
            document_id: document_id.into(),
            participants: IndexMap::new(),
            locks: LockTable::default(),
            last_content: BTreeMap::new(),
            max_participants: None,
            joins: 0,
        }
    }

    pub fn with_max_participants(mut self, max: Option<usize>) -> Self {
        self.max_participants = max;
        self
    }

    pub fn participant(&self, connection_id: ConnectionId) -> Option<&RoomParticipant> {
        self.participants.get(&connection_id)
    }

    pub fn is_participant(&self, connection_id: ConnectionId) -> bool {
        self.participants.contains_key(&connection_id)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn lock_holder(&self, slide_id: SlideId) -> Option<ConnectionId> {
        self.locks.holder(slide_id)
    }

    pub fn locks(&self) -> &LockTable {
        &self.locks
    }

    pub fn last_content(&self, slide_id: SlideId) -> Option<&Value> {
        self.last_content.get(&slide_id)
    }

    /// Point-in-time copy of the full room state
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            document_id: self.document_id.clone(),
            participants: self
                .participants
                .values()
                .map(|p| p.to_participant())
                .collect(),
            locks: self
                .locks
                .iter()
                .map(|(slide_id, connection_id)| LockEntry {
                    slide_id,
                    connection_id,
                })
                .collect(),
            content: self
                .last_content
                .iter()
                .map(|(slide_id, payload)| SlideContent {
                    slide_id: *slide_id,
                    payload: payload.clone(),
                })
                .collect(),
        }
    }

    /// Full departure of a connection: release its locks, then remove its presence.
    ///
    /// Safe to call for a connection that is not (or no longer) a participant.
    pub fn depart(&mut self, connection_id: ConnectionId) -> Vec<Outbound> {
        let (_, mut outbound) = self.release_all_locks(connection_id);
        outbound.extend(self.leave(connection_id));
        outbound
    }

    /// Drop lock entries whose holder is not a participant.
    ///
    /// Returns the freed slides so callers can announce them. Each one is logged as an
    /// invariant violation.
    pub fn heal_orphaned_locks(&mut self) -> Vec<SlideId> {
        let orphaned: Vec<(SlideId, ConnectionId)> = self
            .locks
            .iter()
            .filter(|(_, holder)| !self.participants.contains_key(holder))
            .collect();
        for (slide_id, holder) in &orphaned {
            error!(
                "Room {} had lock on slide {} held by absent connection {}, dropping it",
                self.document_id, slide_id, holder
            );
            self.locks.release(*holder, *slide_id);
        }
        orphaned.into_iter().map(|(slide_id, _)| slide_id).collect()
    }

    pub(crate) fn require_participant(
        &self,
        connection_id: ConnectionId,
    ) -> Result<&RoomParticipant, RoomError> {
        self.participants
            .get(&connection_id)
            .ok_or(RoomError::NotJoined)
    }
}

/// Wall-clock time as milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
