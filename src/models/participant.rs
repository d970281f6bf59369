use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::presence::CursorPosition;

/// Role of a participant within a session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Owner,
    Editor,
    Viewer,
}

impl ParticipantRole {
    /// Editing is allowed for owners and editors, never for viewers.
    pub fn can_edit(&self) -> bool {
        matches!(self, ParticipantRole::Owner | ParticipantRole::Editor)
    }
}

/// Presence status derived from session events and activity
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

/// A member of a collaborative session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: ParticipantRole,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    pub is_typing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            avatar: None,
            role,
            status: PresenceStatus::Online,
            last_seen: Utc::now(),
            is_typing: false,
            cursor: None,
        }
    }
}
