//! Subscription channels for producer-pushed events.
//!
//! A connection subscribes to a topic (the generation progress of a document, or the
//! notifications of a user) independently of any room it has joined. Producers publish to a
//! topic and every current member receives the event.

use crate::outbox::{Outbox, try_deliver};
use crate::protocol::{ConnectionId, DocumentId, ServerMessage, UserId};
use dashmap::DashMap;
use metrics::counter;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A named subscription group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    GenerationProgress(DocumentId),
    Notifications(UserId),
}

impl Topic {
    /// Metrics label of the topic family
    pub fn kind(&self) -> &'static str {
        match self {
            Topic::GenerationProgress(_) => "generation-progress",
            Topic::Notifications(_) => "notifications",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::GenerationProgress(document_id) => {
                write!(f, "generation-progress:{}", document_id)
            }
            Topic::Notifications(user_id) => write!(f, "notifications:{}", user_id),
        }
    }
}

/// Membership of every subscription group.
///
/// Groups exist only while they have members.
#[derive(Default)]
pub struct SubscriptionHub {
    groups: DashMap<Topic, HashMap<ConnectionId, Outbox>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a group. Subscribing twice is a no-op.
    pub fn subscribe(&self, topic: Topic, connection_id: ConnectionId, outbox: Outbox) {
        debug!("{} subscribed to {}", connection_id, topic);
        self.groups
            .entry(topic)
            .or_default()
            .insert(connection_id, outbox);
    }

    /// Remove a connection from a group. Returns whether it was a member.
    pub fn unsubscribe(&self, topic: &Topic, connection_id: ConnectionId) -> bool {
        let removed = match self.groups.get_mut(topic) {
            Some(mut members) => members.remove(&connection_id).is_some(),
            None => return false,
        };
        self.groups.remove_if(topic, |_, members| members.is_empty());
        if removed {
            debug!("{} unsubscribed from {}", connection_id, topic);
        }
        removed
    }

    /// Remove a connection from every group in `topics`
    pub fn unsubscribe_all<'a>(
        &self,
        topics: impl IntoIterator<Item = &'a Topic>,
        connection_id: ConnectionId,
    ) {
        for topic in topics {
            self.unsubscribe(topic, connection_id);
        }
    }

    /// Deliver a message to every member of a group.
    ///
    /// Returns the number of members the message was enqueued for. Publishing to a group
    /// without members is not an error.
    pub fn publish(&self, topic: &Topic, message: ServerMessage) -> usize {
        counter!("collab_published_total", "group" => topic.kind()).increment(1);

        // Clone the members out so no map guard is held while enqueueing
        let members: Vec<(ConnectionId, Outbox)> = match self.groups.get(topic) {
            Some(members) => members
                .iter()
                .map(|(id, outbox)| (*id, outbox.clone()))
                .collect(),
            None => {
                debug!("Published to {} with no subscribers", topic);
                return 0;
            }
        };

        members
            .iter()
            .filter(|(id, outbox)| try_deliver(outbox, *id, message.clone()))
            .count()
    }

    pub fn member_count(&self, topic: &Topic) -> usize {
        self.groups.get(topic).map(|m| m.len()).unwrap_or(0)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn clear(&self) {
        self.groups.clear();
    }
}
