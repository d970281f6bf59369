use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cursor coordinates in the shared canvas/document space
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// A contiguous text selection, zero-based character offsets
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

/// Viewport scroll offsets
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
}

/// Ephemeral per-user activity signals. Never part of the event history
/// and never retried on disconnect.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceInfo {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<SelectionRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    pub last_activity: DateTime<Utc>,
}

impl PresenceInfo {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            cursor: None,
            selection: None,
            viewport: None,
            last_activity: now,
        }
    }
}

/// Partial presence update from the local UI. Missing fields keep their
/// last known value when merged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresencePatch {
    pub cursor: Option<CursorPosition>,
    pub selection: Option<SelectionRange>,
    pub viewport: Option<Viewport>,
    pub last_activity: Option<DateTime<Utc>>,
}
