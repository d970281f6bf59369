use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::participant::Participant;
use super::presence::CursorPosition;
use super::session::Session;

/// A chat message carried by MESSAGE_* events
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

/// Typed payload of a session event. Unknown tags are rejected when the
/// envelope is deserialized at the protocol boundary.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum EventPayload {
    UserJoined { user: Participant },
    UserLeft { user_id: String },
    MessageSent { message: ChatMessage },
    MessageEdited { message_id: Uuid, content: String, edited_at: DateTime<Utc> },
    MessageDeleted { message_id: Uuid },
    CursorMove { user_id: String, cursor: CursorPosition },
    TypingStart { user_id: String },
    TypingStop { user_id: String },
    SessionSync { session: Session },
    ConflictDetected { conflict_id: Uuid, detail: Value },
}

impl EventPayload {
    /// Wire tag of this payload, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::UserJoined { .. } => "USER_JOINED",
            EventPayload::UserLeft { .. } => "USER_LEFT",
            EventPayload::MessageSent { .. } => "MESSAGE_SENT",
            EventPayload::MessageEdited { .. } => "MESSAGE_EDITED",
            EventPayload::MessageDeleted { .. } => "MESSAGE_DELETED",
            EventPayload::CursorMove { .. } => "CURSOR_MOVE",
            EventPayload::TypingStart { .. } => "TYPING_START",
            EventPayload::TypingStop { .. } => "TYPING_STOP",
            EventPayload::SessionSync { .. } => "SESSION_SYNC",
            EventPayload::ConflictDetected { .. } => "CONFLICT_DETECTED",
        }
    }
}

/// A durable session event. Immutable once created; versions are assigned
/// monotonically per session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub id: Uuid,
    pub session_id: String,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub acknowledged: bool,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(session_id: impl Into<String>, author_id: impl Into<String>, version: u64, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            author_id: author_id.into(),
            timestamp: Utc::now(),
            version,
            acknowledged: false,
            payload,
        }
    }
}
