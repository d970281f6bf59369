use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Document edit primitive
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Delete,
    Retain,
    Format,
}

/// A single document edit. Positions are zero-based character offsets,
/// lengths are character counts, never bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: Uuid,
    pub kind: OperationKind,
    pub position: usize,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
    /// The session version this operation was computed against.
    pub base_version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
}

impl Operation {
    pub fn insert(position: usize, content: impl Into<String>, author_id: impl Into<String>, base_version: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: OperationKind::Insert,
            position,
            author_id: author_id.into(),
            timestamp: Utc::now(),
            base_version,
            content: Some(content.into()),
            length: None,
            attributes: None,
        }
    }

    pub fn delete(position: usize, length: usize, author_id: impl Into<String>, base_version: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: OperationKind::Delete,
            position,
            author_id: author_id.into(),
            timestamp: Utc::now(),
            base_version,
            content: None,
            length: Some(length),
            attributes: None,
        }
    }

    /// Character count contributed by an insert, 0 for other kinds.
    pub fn content_len(&self) -> usize {
        match self.kind {
            OperationKind::Insert => self.content.as_deref().map(|c| c.chars().count()).unwrap_or(0),
            _ => 0,
        }
    }

    /// Character count removed by a delete, 0 for other kinds.
    pub fn delete_len(&self) -> usize {
        match self.kind {
            OperationKind::Delete => self.length.unwrap_or(0),
            _ => 0,
        }
    }
}
