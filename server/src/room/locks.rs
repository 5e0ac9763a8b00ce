//! Per-room slide locks.
//!
//! Each slide is either unlocked or locked by exactly one connection. There is no expiry: a lock
//! lives until its holder releases it or departs the room.

use crate::protocol::{ConnectionId, ServerMessage, SlideId};
use crate::room::state::{Outbound, Room, RoomError};
use metrics::counter;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Result of a lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    Granted,
    Denied(RoomError),
}

/// Result of a lock release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The requester was not the holder; nothing changed
    Ignored,
}

/// slide -> holder
#[derive(Debug, Default, Clone)]
pub struct LockTable {
    holders: BTreeMap<SlideId, ConnectionId>,
}

impl LockTable {
    /// Take the lock on `slide_id`.
    ///
    /// Returns `Ok(true)` if newly taken, `Ok(false)` if `connection_id` already held it, and
    /// `Err(holder)` if another connection holds it.
    pub fn acquire(
        &mut self,
        connection_id: ConnectionId,
        slide_id: SlideId,
    ) -> Result<bool, ConnectionId> {
        match self.holders.get(&slide_id) {
            Some(holder) if *holder == connection_id => Ok(false),
            Some(holder) => Err(*holder),
            None => {
                self.holders.insert(slide_id, connection_id);
                Ok(true)
            }
        }
    }

    /// Release `slide_id` if and only if `connection_id` holds it
    pub fn release(&mut self, connection_id: ConnectionId, slide_id: SlideId) -> bool {
        if self.holders.get(&slide_id) == Some(&connection_id) {
            self.holders.remove(&slide_id);
            true
        } else {
            false
        }
    }

    /// Release every lock held by `connection_id`, returning the freed slides in order
    pub fn release_all(&mut self, connection_id: ConnectionId) -> Vec<SlideId> {
        let freed = self.held_by(connection_id);
        for slide_id in &freed {
            self.holders.remove(slide_id);
        }
        freed
    }

    pub fn holder(&self, slide_id: SlideId) -> Option<ConnectionId> {
        self.holders.get(&slide_id).copied()
    }

    pub fn held_by(&self, connection_id: ConnectionId) -> Vec<SlideId> {
        self.holders
            .iter()
            .filter(|(_, holder)| **holder == connection_id)
            .map(|(slide_id, _)| *slide_id)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlideId, ConnectionId)> + '_ {
        self.holders.iter().map(|(s, c)| (*s, *c))
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

impl Room {
    /// Ask for exclusive edit rights on a slide.
    ///
    /// Granted iff nobody else holds the slide. The requester gets `lock-granted` or
    /// `lock-denied`; on a fresh grant everyone else gets `slide-locked`.
    pub fn request_lock(
        &mut self,
        connection_id: ConnectionId,
        slide_id: SlideId,
    ) -> (LockOutcome, Vec<Outbound>) {
        let participant = match self.require_participant(connection_id) {
            Ok(p) => p.to_participant(),
            Err(e) => return deny_lock(connection_id, slide_id, e),
        };

        let mut outbound: Vec<Outbound> = Vec::new();
        if let Some(holder) = self.locks.holder(slide_id)
            && !self.participants.contains_key(&holder)
        {
            outbound.extend(
                self.heal_orphaned_locks()
                    .into_iter()
                    .map(|freed| Outbound::all(ServerMessage::SlideUnlocked { slide_id: freed })),
            );
        }

        match self.locks.acquire(connection_id, slide_id) {
            Ok(newly_taken) => {
                counter!("collab_locks_granted_total").increment(1);
                outbound.push(Outbound::only(
                    connection_id,
                    ServerMessage::LockGranted { slide_id },
                ));
                if newly_taken {
                    debug!(
                        "Slide {} of {} locked by {}",
                        slide_id, self.document_id, connection_id
                    );
                    outbound.push(Outbound::others(
                        connection_id,
                        ServerMessage::SlideLocked {
                            slide_id,
                            holder: connection_id,
                            participant,
                        },
                    ));
                }
                (LockOutcome::Granted, outbound)
            }
            Err(holder) => {
                let holder_name = self
                    .participants
                    .get(&holder)
                    .map(|p| p.identity.display_name.clone())
                    .unwrap_or_else(|| "another user".to_string());
                let (outcome, denied) =
                    deny_lock(connection_id, slide_id, RoomError::LockedBy(holder_name));
                outbound.extend(denied);
                (outcome, outbound)
            }
        }
    }

    /// Give up edit rights on a slide.
    ///
    /// A release from anyone but the holder is ignored without an error.
    pub fn release_lock(
        &mut self,
        connection_id: ConnectionId,
        slide_id: SlideId,
    ) -> (ReleaseOutcome, Vec<Outbound>) {
        if self.locks.release(connection_id, slide_id) {
            debug!(
                "Slide {} of {} released by {}",
                slide_id, self.document_id, connection_id
            );
            (
                ReleaseOutcome::Released,
                vec![Outbound::all(ServerMessage::SlideUnlocked { slide_id })],
            )
        } else {
            (ReleaseOutcome::Ignored, Vec::new())
        }
    }

    /// Release every lock held by a departing connection.
    ///
    /// The `slide-unlocked` notices go to everyone but the departing connection.
    pub fn release_all_locks(
        &mut self,
        connection_id: ConnectionId,
    ) -> (Vec<SlideId>, Vec<Outbound>) {
        let freed = self.locks.release_all(connection_id);
        if !freed.is_empty() {
            info!(
                "Released {} lock(s) of departing connection {} in {}",
                freed.len(),
                connection_id,
                self.document_id
            );
        }
        let outbound = freed
            .iter()
            .map(|slide_id| {
                Outbound::others(
                    connection_id,
                    ServerMessage::SlideUnlocked {
                        slide_id: *slide_id,
                    },
                )
            })
            .collect();
        (freed, outbound)
    }
}

pub(crate) fn deny_lock(
    connection_id: ConnectionId,
    slide_id: SlideId,
    reason: RoomError,
) -> (LockOutcome, Vec<Outbound>) {
    counter!("collab_locks_denied_total").increment(1);
    let outbound = vec![Outbound::only(
        connection_id,
        ServerMessage::LockDenied {
            slide_id,
            reason: reason.to_string(),
        },
    )];
    (LockOutcome::Denied(reason), outbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::state::Recipients;
    use crate::test_utils::identity;
    use uuid::Uuid;

    fn room_with(names: &[&str]) -> (Room, Vec<ConnectionId>) {
        let mut room = Room::new("doc-1");
        let ids: Vec<ConnectionId> = names
            .iter()
            .map(|name| {
                let id = Uuid::new_v4();
                room.join(id, identity(name, name), 0).unwrap();
                id
            })
            .collect();
        (room, ids)
    }

    #[test]
    fn test_lock_table_mutual_exclusion() {
        let mut table = LockTable::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(table.acquire(a, 3), Ok(true));
        assert_eq!(table.acquire(a, 3), Ok(false));
        assert_eq!(table.acquire(b, 3), Err(a));
        assert!(!table.release(b, 3));
        assert_eq!(table.holder(3), Some(a));
        assert!(table.release(a, 3));
        assert_eq!(table.acquire(b, 3), Ok(true));
    }

    #[test]
    fn test_lock_table_release_all() {
        let mut table = LockTable::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        table.acquire(a, 2).unwrap();
        table.acquire(b, 5).unwrap();
        table.acquire(a, 1).unwrap();

        assert_eq!(table.release_all(a), vec![1, 2]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.holder(5), Some(b));
        assert!(table.release_all(a).is_empty());
    }

    #[test]
    fn test_grant_notifies_requester_and_others() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let (a, _) = (ids[0], ids[1]);

        let (outcome, outbound) = room.request_lock(a, 3);
        assert_eq!(outcome, LockOutcome::Granted);
        assert_eq!(outbound.len(), 2);
        assert_eq!(outbound[0].to, Recipients::Only(a));
        assert!(matches!(
            outbound[0].message,
            ServerMessage::LockGranted { slide_id: 3 }
        ));
        assert_eq!(outbound[1].to, Recipients::AllExcept(a));
        match &outbound[1].message {
            ServerMessage::SlideLocked {
                slide_id,
                holder,
                participant,
            } => {
                assert_eq!(*slide_id, 3);
                assert_eq!(*holder, a);
                assert_eq!(participant.display_name, "Alice");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_contended_lock_denied_with_holder_name() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let (a, b) = (ids[0], ids[1]);
        room.request_lock(a, 3);

        let (outcome, outbound) = room.request_lock(b, 3);
        assert_eq!(
            outcome,
            LockOutcome::Denied(RoomError::LockedBy("Alice".to_string()))
        );
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].to, Recipients::Only(b));
        match &outbound[0].message {
            ServerMessage::LockDenied { slide_id, reason } => {
                assert_eq!(*slide_id, 3);
                assert!(reason.contains("Alice"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(room.lock_holder(3), Some(a));
    }

    #[test]
    fn test_reacquire_by_holder_is_granted_without_broadcast() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let a = ids[0];
        room.request_lock(a, 3);

        let (outcome, outbound) = room.request_lock(a, 3);
        assert_eq!(outcome, LockOutcome::Granted);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].to, Recipients::Only(a));
    }

    #[test]
    fn test_non_participant_cannot_lock() {
        let (mut room, _) = room_with(&["Alice"]);
        let stranger = Uuid::new_v4();

        let (outcome, _) = room.request_lock(stranger, 1);
        assert_eq!(outcome, LockOutcome::Denied(RoomError::NotJoined));
        assert!(room.locks().is_empty());
    }

    #[test]
    fn test_release_by_non_holder_is_ignored() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let (a, b) = (ids[0], ids[1]);
        room.request_lock(a, 3);

        let (outcome, outbound) = room.release_lock(b, 3);
        assert_eq!(outcome, ReleaseOutcome::Ignored);
        assert!(outbound.is_empty());
        assert_eq!(room.lock_holder(3), Some(a));

        let (outcome, outbound) = room.release_lock(b, 99);
        assert_eq!(outcome, ReleaseOutcome::Ignored);
        assert!(outbound.is_empty());
    }

    #[test]
    fn test_release_broadcasts_to_whole_room() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let a = ids[0];
        room.request_lock(a, 3);

        let (outcome, outbound) = room.release_lock(a, 3);
        assert_eq!(outcome, ReleaseOutcome::Released);
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].to, Recipients::All);
        assert!(matches!(
            outbound[0].message,
            ServerMessage::SlideUnlocked { slide_id: 3 }
        ));
        assert_eq!(room.lock_holder(3), None);
    }

    #[test]
    fn test_orphaned_holder_is_healed_on_request() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let b = ids[1];
        let ghost = Uuid::new_v4();
        room.locks.acquire(ghost, 4).unwrap();

        let (outcome, outbound) = room.request_lock(b, 4);
        assert_eq!(outcome, LockOutcome::Granted);
        assert_eq!(room.lock_holder(4), Some(b));

        // Everyone first learns the stale lock is gone, then sees the new holder
        let kinds: Vec<&str> = outbound.iter().map(|o| o.message.message_type()).collect();
        assert_eq!(kinds, vec!["slide-unlocked", "lock-granted", "slide-locked"]);
        assert_eq!(outbound[0].to, Recipients::All);
        assert!(matches!(
            outbound[0].message,
            ServerMessage::SlideUnlocked { slide_id: 4 }
        ));
    }

    /// Lock contention and handoff between two editors
    #[test]
    fn test_lock_handoff_scenario() {
        let (mut room, ids) = room_with(&["Alice", "Bob"]);
        let (a, b) = (ids[0], ids[1]);

        assert_eq!(room.request_lock(a, 3).0, LockOutcome::Granted);
        assert!(matches!(room.request_lock(b, 3).0, LockOutcome::Denied(_)));
        assert_eq!(room.release_lock(a, 3).0, ReleaseOutcome::Released);
        assert_eq!(room.request_lock(b, 3).0, LockOutcome::Granted);
        assert_eq!(room.lock_holder(3), Some(b));
    }
}
