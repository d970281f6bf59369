use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::models::{ConflictRecord, ConflictResolution, ConflictStrategy, SessionEvent};

/// Detects concurrent authorship and keeps the conflict ledger. Resolution
/// payloads come from outside; this component only does the bookkeeping.
#[derive(Default)]
pub struct ConflictDetector {
    records: HashMap<Uuid, ConflictRecord>,
}

impl ConflictDetector {
    /// A conflict exists when an incoming event carries exactly the local
    /// base version and was authored by someone else: both sides produced
    /// state at the same version independently.
    pub fn detect(
        &mut self,
        event: &SessionEvent,
        base_version: u64,
        local_user_id: &str,
        default_strategy: ConflictStrategy,
    ) -> Option<ConflictRecord> {
        if event.version != base_version || event.author_id == local_user_id {
            return None;
        }

        let record = ConflictRecord {
            id: Uuid::new_v4(),
            session_id: event.session_id.clone(),
            events: vec![event.clone()],
            strategy: default_strategy,
            resolved: false,
            resolution: None,
        };
        info!(
            "Conflict detected in session {}: event {} by {} at version {}",
            event.session_id, event.id, event.author_id, event.version
        );
        self.records.insert(record.id, record.clone());
        Some(record)
    }

    /// Mark a conflict resolved with the caller-supplied resolution detail.
    pub fn resolve(&mut self, id: Uuid, resolution: ConflictResolution) -> Result<ConflictRecord, SyncError> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| SyncError::State(format!("unknown conflict {}", id)))?;
        if record.resolved {
            warn!("Conflict {} was already resolved", id);
        }
        record.resolved = true;
        record.resolution = Some(resolution);
        Ok(record.clone())
    }

    /// Track a conflict raised elsewhere (a CONFLICT frame from the relay).
    pub fn track(&mut self, record: ConflictRecord) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: Uuid) -> Option<&ConflictRecord> {
        self.records.get(&id)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records.values().filter(|r| !r.resolved)
    }

    pub fn all(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::EventPayload;

    fn event(version: u64, author: &str) -> SessionEvent {
        SessionEvent::new("s1", author, version, EventPayload::TypingStop { user_id: author.to_string() })
    }

    #[test]
    fn detects_same_version_other_author() {
        let mut detector = ConflictDetector::default();
        let record = detector.detect(&event(4, "them"), 4, "me", ConflictStrategy::Merge);
        let record = record.expect("conflict expected");
        assert_eq!(record.strategy, ConflictStrategy::Merge);
        assert!(!record.resolved);
        assert_eq!(detector.unresolved().count(), 1);
    }

    #[test]
    fn no_conflict_for_other_versions_or_own_events() {
        let mut detector = ConflictDetector::default();
        assert!(detector.detect(&event(5, "them"), 4, "me", ConflictStrategy::Manual).is_none());
        assert!(detector.detect(&event(4, "me"), 4, "me", ConflictStrategy::Manual).is_none());
        assert_eq!(detector.all().count(), 0);
    }

    #[test]
    fn resolve_stamps_record() {
        let mut detector = ConflictDetector::default();
        let record = detector
            .detect(&event(2, "them"), 2, "me", ConflictStrategy::Manual)
            .unwrap();

        let resolution = ConflictResolution {
            resolved_by: "me".to_string(),
            resolved_at: Utc::now(),
            payload: serde_json::json!({"chosen": "theirs"}),
        };
        let resolved = detector.resolve(record.id, resolution).unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolution.as_ref().unwrap().resolved_by, "me");
        assert_eq!(detector.unresolved().count(), 0);
    }

    #[test]
    fn resolving_unknown_conflict_is_a_state_error() {
        let mut detector = ConflictDetector::default();
        let resolution = ConflictResolution {
            resolved_by: "me".to_string(),
            resolved_at: Utc::now(),
            payload: serde_json::Value::Null,
        };
        let err = detector.resolve(Uuid::new_v4(), resolution).unwrap_err();
        assert!(matches!(err, SyncError::State(_)));
    }
}
