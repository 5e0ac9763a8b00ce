use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Transport-assigned identifier of one live connection
pub type ConnectionId = Uuid;

/// Identifier of a shared document (a "project")
pub type DocumentId = String;

/// Index of a slide within its document
pub type SlideId = u64;

/// User identifier as supplied by the client.
///
/// Clients send either a JSON string or a JSON integer; both normalize to the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "UserIdRepr", into = "String")]
pub struct UserId(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum UserIdRepr {
    Text(String),
    Number(i64),
}

impl From<UserIdRepr> for UserId {
    fn from(repr: UserIdRepr) -> Self {
        match repr {
            UserIdRepr::Text(s) => UserId(s),
            UserIdRepr::Number(n) => UserId(n.to_string()),
        }
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_string())
    }
}

impl From<i64> for UserId {
    fn from(n: i64) -> Self {
        UserId(n.to_string())
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client to Server messages
///
/// Frames look like `{"event": "request-lock", "data": {"documentId": "doc-1", "slideId": 3}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Join the collaboration room of a document
    JoinRoom {
        document_id: DocumentId,
        participant: ParticipantIdentity,
    },
    /// Leave the current room without closing the connection
    LeaveRoom { document_id: DocumentId },
    /// Move the cursor
    CursorMove {
        document_id: DocumentId,
        cursor: Cursor,
    },
    /// Focus a different slide
    SlideChange {
        document_id: DocumentId,
        slide_id: SlideId,
    },
    /// Ask for exclusive edit rights on a slide
    RequestLock {
        document_id: DocumentId,
        slide_id: SlideId,
    },
    /// Give up edit rights on a slide
    ReleaseLock {
        document_id: DocumentId,
        slide_id: SlideId,
    },
    /// Push new slide content (requires the slide lock)
    SlideUpdate {
        document_id: DocumentId,
        slide_id: SlideId,
        #[serde(alias = "content")]
        payload: Value,
        #[serde(default, alias = "operation", skip_serializing_if = "Option::is_none")]
        op_metadata: Option<Value>,
    },
    /// Conversational message to the whole room
    ChatMessage {
        document_id: DocumentId,
        #[serde(alias = "message")]
        text: String,
    },
    SubscribeGeneration { document_id: DocumentId },
    UnsubscribeGeneration { document_id: DocumentId },
    SubscribeNotifications { user_id: UserId },
    UnsubscribeNotifications { user_id: UserId },
    /// Application-level keepalive. Accepted with or without a `data` body, which is ignored.
    Ping(Option<Value>),
}

/// Server to Client messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full room state, sent to a connection right after it joins
    RoomState(RoomSnapshot),
    /// A participant joined
    ParticipantJoined { participant: Participant },
    /// A participant left (explicitly or by disconnecting)
    ParticipantLeft {
        connection_id: ConnectionId,
        participant: Participant,
    },
    /// Another participant moved their cursor
    CursorUpdated {
        connection_id: ConnectionId,
        cursor: Cursor,
    },
    /// Another participant focused a different slide
    ActiveSlideChanged {
        connection_id: ConnectionId,
        slide_id: SlideId,
    },
    /// Acknowledgment to the requester of a lock
    LockGranted { slide_id: SlideId },
    /// Lock request refused
    LockDenied { slide_id: SlideId, reason: String },
    /// Another participant now holds the lock on a slide
    SlideLocked {
        slide_id: SlideId,
        holder: ConnectionId,
        participant: Participant,
    },
    /// A slide lock was released
    SlideUnlocked { slide_id: SlideId },
    /// Content relayed from the lock holder
    SlideSynced {
        slide_id: SlideId,
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        op_metadata: Option<Value>,
        author_connection_id: ConnectionId,
    },
    /// A content update was refused
    SyncRejected { slide_id: SlideId, reason: String },
    /// Chat message, delivered to every member including the author
    ChatMessage {
        connection_id: ConnectionId,
        participant: Participant,
        text: String,
        timestamp: u64,
    },
    /// Progress of a content-generation job for a document
    GenerationProgress {
        document_id: DocumentId,
        timestamp: u64,
        #[serde(flatten)]
        progress: GenerationProgress,
    },
    /// Notification pushed to a user
    #[serde(rename = "new-notification")]
    Notification { notification: Value },
    /// Request-level error
    Error { code: ErrorCode, message: String },
    /// Pong response (to client's Ping)
    Pong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidMessage,
    RoomFull,
}

/// Identity a client presents when joining a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantIdentity {
    pub user_id: UserId,
    #[serde(default, alias = "userName")]
    pub display_name: String,
    #[serde(default)]
    pub color: String,
}

/// 2-D cursor position in the client's canvas coordinates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
}

/// Participant info
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_slide: Option<SlideId>,
    pub joined_at: u64,
}

/// One held slide lock
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub slide_id: SlideId,
    pub connection_id: ConnectionId,
}

/// Last relayed content of one slide
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlideContent {
    pub slide_id: SlideId,
    pub payload: Value,
}

/// Room snapshot for state transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub document_id: DocumentId,
    pub participants: Vec<Participant>,
    pub locks: Vec<LockEntry>,
    pub content: Vec<SlideContent>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Started,
    Analyzing,
    Generating,
    SlideCreated,
    Completed,
    Error,
}

/// Progress report from a content-generation producer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub status: GenerationStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_slide: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_slides: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ClientMessage::JoinRoom { .. } => "join-room",
            ClientMessage::LeaveRoom { .. } => "leave-room",
            ClientMessage::CursorMove { .. } => "cursor-move",
            ClientMessage::SlideChange { .. } => "slide-change",
            ClientMessage::RequestLock { .. } => "request-lock",
            ClientMessage::ReleaseLock { .. } => "release-lock",
            ClientMessage::SlideUpdate { .. } => "slide-update",
            ClientMessage::ChatMessage { .. } => "chat-message",
            ClientMessage::SubscribeGeneration { .. } => "subscribe-generation",
            ClientMessage::UnsubscribeGeneration { .. } => "unsubscribe-generation",
            ClientMessage::SubscribeNotifications { .. } => "subscribe-notifications",
            ClientMessage::UnsubscribeNotifications { .. } => "unsubscribe-notifications",
            ClientMessage::Ping(_) => "ping",
        }
    }
}

impl ServerMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::RoomState(_) => "room-state",
            ServerMessage::ParticipantJoined { .. } => "participant-joined",
            ServerMessage::ParticipantLeft { .. } => "participant-left",
            ServerMessage::CursorUpdated { .. } => "cursor-updated",
            ServerMessage::ActiveSlideChanged { .. } => "active-slide-changed",
            ServerMessage::LockGranted { .. } => "lock-granted",
            ServerMessage::LockDenied { .. } => "lock-denied",
            ServerMessage::SlideLocked { .. } => "slide-locked",
            ServerMessage::SlideUnlocked { .. } => "slide-unlocked",
            ServerMessage::SlideSynced { .. } => "slide-synced",
            ServerMessage::SyncRejected { .. } => "sync-rejected",
            ServerMessage::ChatMessage { .. } => "chat-message",
            ServerMessage::GenerationProgress { .. } => "generation-progress",
            ServerMessage::Notification { .. } => "new-notification",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong => "pong",
        }
    }
}
