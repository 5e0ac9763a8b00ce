use crate::outbox::{Outbox, try_deliver};
use crate::protocol::{ConnectionId, DocumentId, ParticipantIdentity, RoomSnapshot};
use crate::room::state::{Outbound, Recipients, Room, RoomError, now_millis};
use dashmap::DashMap;
use metrics::counter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A room together with the outboxes of its members.
///
/// The mutex around a slot is the room's serialization point: every transition of the room
/// and the delivery of its results happen while it is held.
#[derive(Debug)]
pub struct RoomSlot {
    room: Room,
    outboxes: HashMap<ConnectionId, Outbox>,
    /// Set once the slot has been removed from the registry
    closed: bool,
}

impl RoomSlot {
    fn new(room: Room) -> Self {
        Self {
            room,
            outboxes: HashMap::new(),
            closed: false,
        }
    }

    /// Enqueue outbound messages in order. Never waits on a consumer.
    fn dispatch(&self, outbound: Vec<Outbound>) {
        for Outbound { to, message } in outbound {
            match to {
                Recipients::Only(id) => {
                    if let Some(outbox) = self.outboxes.get(&id) {
                        try_deliver(outbox, id, message);
                    }
                }
                _ => {
                    for (id, outbox) in &self.outboxes {
                        if to.includes(*id) {
                            try_deliver(outbox, *id, message.clone());
                        }
                    }
                }
            }
        }
    }
}

/// Process-wide map of live rooms.
///
/// Rooms are created on first join and removed as soon as their last participant departs.
/// Each room is serialized by its own mutex; operations on different rooms never contend.
pub struct RoomRegistry {
    rooms: DashMap<DocumentId, Arc<Mutex<RoomSlot>>>,
    max_participants: Option<usize>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::with_max_participants(None)
    }

    pub fn with_max_participants(max_participants: Option<usize>) -> Self {
        Self {
            rooms: DashMap::new(),
            max_participants,
        }
    }

    /// Get the room of a document, creating it if needed. Never fails.
    pub fn get_or_create_room(&self, document_id: &str) -> Arc<Mutex<RoomSlot>> {
        self.rooms
            .entry(document_id.to_string())
            .or_insert_with(|| {
                info!("Created room {}", document_id);
                counter!("collab_rooms_created_total").increment(1);
                let room = Room::new(document_id).with_max_participants(self.max_participants);
                Arc::new(Mutex::new(RoomSlot::new(room)))
            })
            .value()
            .clone()
    }

    fn get_room(&self, document_id: &str) -> Option<Arc<Mutex<RoomSlot>>> {
        self.rooms.get(document_id).map(|entry| entry.value().clone())
    }

    /// Add a connection to a document's room and deliver `room-state` / `participant-joined`.
    pub async fn join(
        &self,
        document_id: &str,
        connection_id: ConnectionId,
        identity: ParticipantIdentity,
        outbox: Outbox,
    ) -> Result<RoomSnapshot, RoomError> {
        loop {
            let slot = self.get_or_create_room(document_id);
            let mut guard = slot.lock().await;
            if guard.closed {
                // Lost a race with the removal of the previous room; the next lookup creates
                // a fresh one.
                drop(guard);
                tokio::task::yield_now().await;
                continue;
            }

            return match guard
                .room
                .join(connection_id, identity.clone(), now_millis())
            {
                Ok((snapshot, outbound)) => {
                    counter!("collab_room_joins_total").increment(1);
                    guard.outboxes.insert(connection_id, outbox);
                    guard.dispatch(outbound);
                    Ok(snapshot)
                }
                Err(e) => {
                    self.retire_if_empty(document_id, &slot, &mut guard);
                    Err(e)
                }
            };
        }
    }

    /// Run one transition on an existing room and deliver what it produces.
    ///
    /// Fails with [`RoomError::RoomNotFound`] if the document has no live room.
    pub async fn with_room<T>(
        &self,
        document_id: &str,
        transition: impl FnOnce(&mut Room) -> (T, Vec<Outbound>),
    ) -> Result<T, RoomError> {
        let slot = self
            .get_room(document_id)
            .ok_or(RoomError::RoomNotFound)?;
        let mut guard = slot.lock().await;
        if guard.closed {
            return Err(RoomError::RoomNotFound);
        }

        let (value, outbound) = transition(&mut guard.room);
        guard.dispatch(outbound);
        Ok(value)
    }

    /// Remove a connection from a room: release its locks, drop its presence, and delete the
    /// room if it became empty. Idempotent.
    ///
    /// Returns whether the connection was a participant.
    pub async fn depart(&self, document_id: &str, connection_id: ConnectionId) -> bool {
        let Some(slot) = self.get_room(document_id) else {
            return false;
        };
        let mut guard = slot.lock().await;
        if guard.closed {
            return false;
        }

        let was_participant = guard.room.is_participant(connection_id);
        let outbound = guard.room.depart(connection_id);
        guard.outboxes.remove(&connection_id);
        guard.dispatch(outbound);
        self.retire_if_empty(document_id, &slot, &mut guard);

        was_participant
    }

    /// Delete a room if it has no participants. No-op otherwise or if it does not exist.
    pub async fn remove_room_if_empty(&self, document_id: &str) -> bool {
        let Some(slot) = self.get_room(document_id) else {
            return false;
        };
        let mut guard = slot.lock().await;
        self.retire_if_empty(document_id, &slot, &mut guard)
    }

    fn retire_if_empty(
        &self,
        document_id: &str,
        slot: &Arc<Mutex<RoomSlot>>,
        guard: &mut RoomSlot,
    ) -> bool {
        if guard.closed || !guard.room.is_empty() {
            return false;
        }

        guard.closed = true;
        guard.outboxes.clear();
        self.rooms
            .remove_if(document_id, |_, existing| Arc::ptr_eq(existing, slot));

        counter!("collab_rooms_deleted_total").increment(1);
        info!("Room {} deleted (empty)", document_id);
        true
    }

    /// Point-in-time copy of a room's state
    pub async fn snapshot(&self, document_id: &str) -> Option<RoomSnapshot> {
        let slot = self.get_room(document_id)?;
        let guard = slot.lock().await;
        if guard.closed {
            return None;
        }
        Some(guard.room.snapshot())
    }

    pub fn contains(&self, document_id: &str) -> bool {
        self.rooms.contains_key(document_id)
    }

    /// Get count of live rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Drop every room. Used at shutdown.
    pub async fn clear(&self) {
        let slots: Vec<Arc<Mutex<RoomSlot>>> =
            self.rooms.iter().map(|entry| entry.value().clone()).collect();
        for slot in slots {
            let mut guard = slot.lock().await;
            guard.closed = true;
            guard.outboxes.clear();
        }
        self.rooms.clear();
        debug!("Room registry cleared");
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
