use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::event::SessionEvent;
use super::session::ConflictResolutionMode;

/// Strategy for producing the resolved payload of a conflict
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    Merge,
    Overwrite,
    Manual,
}

impl From<ConflictResolutionMode> for ConflictStrategy {
    fn from(mode: ConflictResolutionMode) -> Self {
        match mode {
            ConflictResolutionMode::Manual => ConflictStrategy::Manual,
            ConflictResolutionMode::Auto => ConflictStrategy::Merge,
            ConflictResolutionMode::OwnerWins => ConflictStrategy::Overwrite,
        }
    }
}

/// Resolution detail supplied by whoever resolved the conflict
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
    /// Merged/chosen payload. The engine stores it, it does not interpret it.
    pub payload: Value,
}

/// A detected case of two authors producing state at the same base version
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: Uuid,
    pub session_id: String,
    pub events: Vec<SessionEvent>,
    pub strategy: ConflictStrategy,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ConflictResolution>,
}
