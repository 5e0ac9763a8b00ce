use crate::outbox::{Outbox, try_deliver};
use crate::protocol::{
    ClientMessage, ConnectionId, DocumentId, ErrorCode, GenerationProgress, RoomSnapshot,
    ServerMessage, UserId,
};
use crate::room::locks::deny_lock;
use crate::room::relay::reject_sync;
use crate::room::{Outbound, Room, RoomError, RoomRegistry, now_millis};
use crate::subscription::{SubscriptionHub, Topic};
use dashmap::DashMap;
use metrics::counter;
use serde_json::Value;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinator configuration
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Maximum participants per room (`None` = unlimited)
    pub max_participants_per_room: Option<usize>,
}

/// Where a connection is in its lifecycle.
///
/// A connection that is gone has no entry at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Joined(DocumentId),
}

struct ConnectionState {
    outbox: Outbox,
    phase: ConnectionPhase,
    subscriptions: HashSet<Topic>,
    last_seen: Instant,
}

/// Session coordinator: owns every room, connection and subscription group.
///
/// Created once at startup and shared through the HTTP layer. All inbound client events and
/// producer publications go through it.
pub struct Coordinator {
    rooms: RoomRegistry,
    subscriptions: SubscriptionHub,
    connections: DashMap<ConnectionId, ConnectionState>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::with_config(CoordinatorConfig::default())
    }

    pub fn with_config(config: CoordinatorConfig) -> Self {
        Self {
            rooms: RoomRegistry::with_max_participants(config.max_participants_per_room),
            subscriptions: SubscriptionHub::new(),
            connections: DashMap::new(),
        }
    }

    /// Register a new connection whose outbound messages go to `outbox`
    pub fn connect(&self, outbox: Outbox) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.connections.insert(
            connection_id,
            ConnectionState {
                outbox,
                phase: ConnectionPhase::Connecting,
                subscriptions: HashSet::new(),
                last_seen: Instant::now(),
            },
        );
        info!("Connection {} registered", connection_id);
        connection_id
    }

    /// Process one inbound client event
    pub async fn handle(&self, connection_id: ConnectionId, msg: ClientMessage) {
        counter!("collab_ws_messages_total", "type" => msg.message_type()).increment(1);
        self.touch(connection_id);

        let Some(outbox) = self.outbox(connection_id) else {
            debug!(
                "Dropping {} from unknown connection {}",
                msg.message_type(),
                connection_id
            );
            return;
        };

        match msg {
            ClientMessage::Ping(_) => {
                try_deliver(&outbox, connection_id, ServerMessage::Pong);
            }
            ClientMessage::JoinRoom {
                document_id,
                participant,
            } => {
                if let Some(ConnectionPhase::Joined(current)) = self.phase(connection_id)
                    && current != document_id
                {
                    self.leave_room(connection_id, &current, "switch").await;
                }

                match self
                    .rooms
                    .join(&document_id, connection_id, participant, outbox.clone())
                    .await
                {
                    Ok(_) => {
                        if !self.set_phase(
                            connection_id,
                            ConnectionPhase::Joined(document_id.clone()),
                        ) {
                            // Disconnected while joining
                            self.rooms.depart(&document_id, connection_id).await;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Join of {} to {} refused: {}",
                            connection_id, document_id, e
                        );
                        let code = match e {
                            RoomError::RoomFull(_) => ErrorCode::RoomFull,
                            _ => ErrorCode::InvalidMessage,
                        };
                        try_deliver(
                            &outbox,
                            connection_id,
                            ServerMessage::Error {
                                code,
                                message: e.to_string(),
                            },
                        );
                    }
                }
            }
            ClientMessage::LeaveRoom { document_id } => {
                if self.phase(connection_id) == Some(ConnectionPhase::Joined(document_id.clone()))
                {
                    self.leave_room(connection_id, &document_id, "leave").await;
                } else {
                    debug!(
                        "Ignoring leave of {} from {}: not joined",
                        document_id, connection_id
                    );
                }
            }
            ClientMessage::CursorMove {
                document_id,
                cursor,
            } => {
                self.apply(&document_id, connection_id, |room| {
                    ((), room.update_cursor(connection_id, cursor))
                })
                .await;
            }
            ClientMessage::SlideChange {
                document_id,
                slide_id,
            } => {
                self.apply(&document_id, connection_id, |room| {
                    ((), room.update_active_slide(connection_id, slide_id))
                })
                .await;
            }
            ClientMessage::RequestLock {
                document_id,
                slide_id,
            } => {
                let result = self
                    .rooms
                    .with_room(&document_id, |room| room.request_lock(connection_id, slide_id))
                    .await;
                if let Err(e) = result {
                    let (_, outbound) = deny_lock(connection_id, slide_id, e);
                    for o in outbound {
                        try_deliver(&outbox, connection_id, o.message);
                    }
                }
            }
            ClientMessage::ReleaseLock {
                document_id,
                slide_id,
            } => {
                self.apply(&document_id, connection_id, |room| {
                    room.release_lock(connection_id, slide_id)
                })
                .await;
            }
            ClientMessage::SlideUpdate {
                document_id,
                slide_id,
                payload,
                op_metadata,
            } => {
                let result = self
                    .rooms
                    .with_room(&document_id, |room| {
                        room.relay_update(connection_id, slide_id, payload, op_metadata)
                    })
                    .await;
                if let Err(e) = result {
                    let (_, outbound) = reject_sync(connection_id, slide_id, e);
                    for o in outbound {
                        try_deliver(&outbox, connection_id, o.message);
                    }
                }
            }
            ClientMessage::ChatMessage { document_id, text } => {
                let now = now_millis();
                self.apply(&document_id, connection_id, |room| {
                    ((), room.chat(connection_id, text, now))
                })
                .await;
            }
            ClientMessage::SubscribeGeneration { document_id } => {
                self.subscribe(connection_id, Topic::GenerationProgress(document_id), outbox);
            }
            ClientMessage::UnsubscribeGeneration { document_id } => {
                self.unsubscribe(connection_id, Topic::GenerationProgress(document_id));
            }
            ClientMessage::SubscribeNotifications { user_id } => {
                self.subscribe(connection_id, Topic::Notifications(user_id), outbox);
            }
            ClientMessage::UnsubscribeNotifications { user_id } => {
                self.unsubscribe(connection_id, Topic::Notifications(user_id));
            }
        }
    }

    /// Run a room transition whose only failure mode is a missing room, which is ignored
    async fn apply<T>(
        &self,
        document_id: &str,
        connection_id: ConnectionId,
        transition: impl FnOnce(&mut Room) -> (T, Vec<Outbound>),
    ) {
        if let Err(e) = self.rooms.with_room(document_id, transition).await {
            debug!(
                "Ignoring event from {} for {}: {}",
                connection_id, document_id, e
            );
        }
    }

    async fn leave_room(
        &self,
        connection_id: ConnectionId,
        document_id: &str,
        reason: &'static str,
    ) {
        self.set_phase(connection_id, ConnectionPhase::Connecting);
        if self.rooms.depart(document_id, connection_id).await {
            counter!("collab_room_leaves_total", "reason" => reason).increment(1);
        }
    }

    fn subscribe(&self, connection_id: ConnectionId, topic: Topic, outbox: Outbox) {
        let Some(mut state) = self.connections.get_mut(&connection_id) else {
            return;
        };
        state.subscriptions.insert(topic.clone());
        drop(state);
        self.subscriptions.subscribe(topic, connection_id, outbox);
    }

    fn unsubscribe(&self, connection_id: ConnectionId, topic: Topic) {
        if let Some(mut state) = self.connections.get_mut(&connection_id) {
            state.subscriptions.remove(&topic);
        }
        self.subscriptions.unsubscribe(&topic, connection_id);
    }

    /// Tear down a connection: leave its room (releasing every lock it holds), then drop its
    /// subscriptions. Calling this more than once is a no-op.
    ///
    /// Returns whether the connection was still registered.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let Some((_, state)) = self.connections.remove(&connection_id) else {
            return false;
        };

        if let ConnectionPhase::Joined(document_id) = &state.phase
            && self.rooms.depart(document_id, connection_id).await
        {
            counter!("collab_room_leaves_total", "reason" => "disconnect").increment(1);
        }
        self.subscriptions
            .unsubscribe_all(&state.subscriptions, connection_id);

        info!("Connection {} disconnected", connection_id);
        true
    }

    /// Record inbound activity on a connection
    pub fn touch(&self, connection_id: ConnectionId) {
        if let Some(mut state) = self.connections.get_mut(&connection_id) {
            state.last_seen = Instant::now();
        }
    }

    /// Whether a connection has been silent for longer than `timeout` (or is gone)
    pub fn is_stale(&self, connection_id: ConnectionId, timeout: Duration) -> bool {
        self.connections
            .get(&connection_id)
            .map(|state| state.last_seen.elapsed() > timeout)
            .unwrap_or(true)
    }

    /// Push generation progress to every subscriber of the document.
    ///
    /// Fire-and-forget; returns the number of subscribers reached.
    pub fn publish_generation_progress(
        &self,
        document_id: &str,
        progress: GenerationProgress,
    ) -> usize {
        let topic = Topic::GenerationProgress(document_id.to_string());
        self.subscriptions.publish(
            &topic,
            ServerMessage::GenerationProgress {
                document_id: document_id.to_string(),
                timestamp: now_millis(),
                progress,
            },
        )
    }

    /// Push a notification to every connection subscribed for the user
    pub fn publish_notification(&self, user_id: &UserId, notification: Value) -> usize {
        let topic = Topic::Notifications(user_id.clone());
        self.subscriptions
            .publish(&topic, ServerMessage::Notification { notification })
    }

    pub fn phase(&self, connection_id: ConnectionId) -> Option<ConnectionPhase> {
        self.connections
            .get(&connection_id)
            .map(|state| state.phase.clone())
    }

    fn set_phase(&self, connection_id: ConnectionId, phase: ConnectionPhase) -> bool {
        match self.connections.get_mut(&connection_id) {
            Some(mut state) => {
                state.phase = phase;
                true
            }
            None => false,
        }
    }

    fn outbox(&self, connection_id: ConnectionId) -> Option<Outbox> {
        self.connections
            .get(&connection_id)
            .map(|state| state.outbox.clone())
    }

    pub async fn room_snapshot(&self, document_id: &str) -> Option<RoomSnapshot> {
        self.rooms.snapshot(document_id).await
    }

    pub fn room_count(&self) -> usize {
        self.rooms.room_count()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Drop all state. Connections still open see their room vanish.
    pub async fn shutdown(&self) {
        let rooms = self.rooms.room_count();
        let connections = self.connections.len();
        self.connections.clear();
        self.subscriptions.clear();
        self.rooms.clear().await;
        info!(
            "Coordinator shut down ({} rooms, {} connections dropped)",
            rooms, connections
        );
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
