use serde::{Deserialize, Serialize};

use super::conflict::ConflictRecord;
use super::event::SessionEvent;
use super::operation::Operation;
use super::participant::Participant;
use super::presence::PresenceInfo;

/// Wire envelope exchanged with the relay. One tagged frame per message,
/// serialized as JSON text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum WireMessage {
    JoinSession { session_id: String, user: Participant },
    LeaveSession { session_id: String, user_id: String },
    Event { event: SessionEvent },
    Operation { operation: Operation },
    PresenceUpdate { presence: PresenceInfo },
    Heartbeat { timestamp: i64 },
    SyncRequest { session_id: String, from_version: u64 },
    SyncResponse { session_id: String, events: Vec<SessionEvent>, version: u64 },
    Conflict { conflict: ConflictRecord },
    Error { error: String, #[serde(skip_serializing_if = "Option::is_none")] code: Option<u16> },
}

impl WireMessage {
    /// Wire tag of this frame, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::JoinSession { .. } => "JOIN_SESSION",
            WireMessage::LeaveSession { .. } => "LEAVE_SESSION",
            WireMessage::Event { .. } => "EVENT",
            WireMessage::Operation { .. } => "OPERATION",
            WireMessage::PresenceUpdate { .. } => "PRESENCE_UPDATE",
            WireMessage::Heartbeat { .. } => "HEARTBEAT",
            WireMessage::SyncRequest { .. } => "SYNC_REQUEST",
            WireMessage::SyncResponse { .. } => "SYNC_RESPONSE",
            WireMessage::Conflict { .. } => "CONFLICT",
            WireMessage::Error { .. } => "ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::EventPayload;

    #[test]
    fn envelope_round_trips_with_screaming_tags() {
        let msg = WireMessage::SyncRequest {
            session_id: "s1".to_string(),
            from_version: 7,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"SYNC_REQUEST\""));
        assert!(json.contains("\"fromVersion\":7"));
        let back: WireMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn event_envelope_flattens_payload_tag() {
        let event = SessionEvent::new("s1", "u1", 3, EventPayload::TypingStart { user_id: "u1".to_string() });
        let json = serde_json::to_string(&WireMessage::Event { event }).unwrap();
        assert!(json.contains("\"type\":\"EVENT\""));
        assert!(json.contains("\"type\":\"TYPING_START\""));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = serde_json::from_str::<WireMessage>("{\"type\":\"TELEPORT\"}");
        assert!(err.is_err());
    }
}
