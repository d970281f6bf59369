use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::participant::Participant;

/// How concurrent edits at the same base version are resolved by default
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolutionMode {
    Manual,
    Auto,
    OwnerWins,
}

/// Permission flags for a session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPermissions {
    pub allow_editing: bool,
    pub allow_inviting: bool,
    pub allow_messaging: bool,
    pub require_approval: bool,
}

impl Default for SessionPermissions {
    fn default() -> Self {
        Self {
            allow_editing: true,
            allow_inviting: true,
            allow_messaging: true,
            require_approval: false,
        }
    }
}

/// Tunable session settings
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSettings {
    pub max_participants: usize,
    pub allow_anonymous: bool,
    pub auto_save: bool,
    pub sync_delay_ms: u64,
    pub conflict_resolution_mode: ConflictResolutionMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_participants: 10,
            allow_anonymous: false,
            auto_save: true,
            sync_delay_ms: 500,
            conflict_resolution_mode: ConflictResolutionMode::Auto,
        }
    }
}

/// Caller-supplied overrides applied on top of the defaults when a
/// session is created or shared.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub permissions: Option<SessionPermissions>,
    pub settings: Option<SessionSettings>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A shared collaborative context joined by multiple participants
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    /// Ordered by join time, unique by participant id.
    pub participants: Vec<Participant>,
    pub permissions: SessionPermissions,
    pub settings: SessionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_url: Option<String>,
}

impl Session {
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == user_id)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}
