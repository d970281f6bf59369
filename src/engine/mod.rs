pub mod conflict;
pub mod event_log;
pub mod ot;
pub mod presence;
pub mod registry;

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::{
    ChatMessage, ConflictRecord, ConflictResolution, ConflictStrategy, EventPayload, Operation,
    Participant, PresenceInfo, PresencePatch, Session, SessionEvent, SessionOptions, WireMessage,
};
use crate::notify::Notifier;

use conflict::ConflictDetector;
use event_log::EventLog;
use ot::PendingOperations;
use presence::PresenceTracker;
use registry::SessionRegistry;

/// Synchronization engine for a single session.
///
/// One instance per session, explicitly constructed and handed to
/// collaborators; all mutation happens through a single local API call or a
/// single inbound message, processed to completion. Local changes are
/// applied optimistically and reconciled when the relay echoes them back.
///
/// Methods that originate traffic return the wire frames to transmit; the
/// connection layer decides whether to send or queue them.
pub struct SyncEngine {
    registry: SessionRegistry,
    log: EventLog,
    pending_ops: PendingOperations,
    conflicts: ConflictDetector,
    presence: PresenceTracker,
    /// Document state confirmed by the relay. The pending operation queue
    /// is the tentative overlay on top of this.
    confirmed_text: String,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
}

impl SyncEngine {
    /// Create a new session owned by `local_user` and the engine driving
    /// it. Emits the initial SESSION_SYNC event at `base_version + 1`.
    pub fn create_session(
        name: impl Into<String>,
        options: SessionOptions,
        local_user: Participant,
        config: &SyncConfig,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
    ) -> (Self, Vec<WireMessage>) {
        let registry = SessionRegistry::create(name, options, local_user, clock.clone());
        let mut engine = Self::with_registry(registry, config, clock, notifier);
        let session = engine.registry.session().clone();
        let outbound = engine.emit_event(EventPayload::SessionSync { session });
        (engine, outbound)
    }

    /// Join an existing session. The local participant map is updated
    /// optimistically before the relay confirms; the returned frames
    /// announce the join and request a sync from the relay's version.
    pub fn join_session(
        session: Session,
        local_user: Participant,
        config: &SyncConfig,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
    ) -> (Self, Vec<WireMessage>) {
        let session_id = session.id.clone();
        let registry = SessionRegistry::join(session, local_user.clone(), clock.clone());
        let engine = Self::with_registry(registry, config, clock, notifier);
        let outbound = vec![
            WireMessage::JoinSession { session_id: session_id.clone(), user: local_user },
            WireMessage::SyncRequest { session_id, from_version: engine.log.base_version() },
        ];
        (engine, outbound)
    }

    fn with_registry(registry: SessionRegistry, config: &SyncConfig, clock: Arc<dyn Clock>, notifier: Notifier) -> Self {
        let presence = PresenceTracker::new(
            registry.local_user_id().to_string(),
            config.presence_debounce_ms,
            config.presence_stale_secs,
            clock.clone(),
        );
        Self {
            registry,
            log: EventLog::new(config.history_limit),
            pending_ops: PendingOperations::default(),
            conflicts: ConflictDetector::default(),
            presence,
            confirmed_text: String::new(),
            notifier,
            clock,
        }
    }

    // ── Local API ───────────────────────────────────────────────────────

    /// Send a chat message into the session.
    pub fn send_message(&mut self, content: impl Into<String>) -> Result<Vec<WireMessage>, SyncError> {
        let author = self.registry.local_user_id().to_string();
        self.registry.ensure_can_message(&author)?;
        let message = ChatMessage {
            id: Uuid::new_v4(),
            author_id: author,
            content: content.into(),
            sent_at: self.clock.now(),
            edited_at: None,
        };
        Ok(self.emit_event(EventPayload::MessageSent { message }))
    }

    /// Flip the local typing indicator and tell the session about it.
    pub fn set_typing(&mut self, typing: bool) -> Vec<WireMessage> {
        let user_id = self.registry.local_user_id().to_string();
        self.registry.set_typing(&user_id, typing);
        let payload = if typing {
            EventPayload::TypingStart { user_id }
        } else {
            EventPayload::TypingStop { user_id }
        };
        self.emit_event(payload)
    }

    /// Author a document operation. Applied to the tentative overlay
    /// immediately; confirmed once the relay echoes it back.
    pub fn submit_operation(&mut self, mut operation: Operation) -> Result<Vec<WireMessage>, SyncError> {
        let author = self.registry.local_user_id().to_string();
        self.registry.ensure_can_edit(&author)?;
        operation.author_id = author;
        operation.base_version = self.log.base_version();
        self.pending_ops.push(operation.clone());
        Ok(vec![WireMessage::Operation { operation }])
    }

    /// Merge a partial presence update; the broadcast is debounced.
    pub fn update_presence(&mut self, patch: PresencePatch) {
        self.presence.update_local(patch);
    }

    /// Take the presence broadcast once its debounce window has elapsed.
    pub fn due_presence_broadcast(&mut self) -> Option<WireMessage> {
        self.presence
            .take_due_broadcast()
            .map(|presence| WireMessage::PresenceUpdate { presence })
    }

    /// Next instant the engine needs to be polled for a presence broadcast.
    pub fn next_presence_deadline(&self) -> Option<chrono::DateTime<Utc>> {
        self.presence.next_deadline()
    }

    /// Cancel debounced broadcasts; called when the session disconnects.
    pub fn cancel_timers(&mut self) {
        self.presence.cancel_pending();
    }

    /// Resolve a conflict with a caller-supplied payload.
    pub fn resolve_conflict(&mut self, conflict_id: Uuid, payload: Value) -> Result<Vec<WireMessage>, SyncError> {
        let resolution = ConflictResolution {
            resolved_by: self.registry.local_user_id().to_string(),
            resolved_at: self.clock.now(),
            payload,
        };
        let record = self.conflicts.resolve(conflict_id, resolution)?;
        self.notifier.info(format!("Conflict {} resolved", conflict_id));
        Ok(vec![WireMessage::Conflict { conflict: record }])
    }

    /// Ask the relay for everything after the current base version.
    pub fn request_sync(&self) -> WireMessage {
        WireMessage::SyncRequest {
            session_id: self.registry.session().id.clone(),
            from_version: self.log.base_version(),
        }
    }

    /// Leave the session, clearing local tentative state.
    pub fn leave_session(&mut self) -> Vec<WireMessage> {
        let user_id = self.registry.local_user_id().to_string();
        let session_id = self.registry.session().id.clone();
        self.registry.apply_leave(&user_id);
        self.pending_ops.clear();
        self.cancel_timers();
        vec![WireMessage::LeaveSession { session_id, user_id }]
    }

    /// Produce a share URL, narrowing invitee permissions per `overrides`.
    pub fn share_session(&mut self, overrides: SessionOptions, base_url: &str) -> Result<(String, Vec<WireMessage>), SyncError> {
        let user_id = self.registry.local_user_id().to_string();
        let url = self.registry.share(&user_id, overrides, base_url)?;
        let session = self.registry.session().clone();
        let outbound = self.emit_event(EventPayload::SessionSync { session });
        Ok((url, outbound))
    }

    // ── Inbound dispatch ────────────────────────────────────────────────

    /// Single entry point for messages delivered by the transport, in
    /// delivery order. A failure handling one message never prevents the
    /// next from being processed.
    pub fn handle_message(&mut self, msg: WireMessage) {
        debug!("Handling inbound {} frame", msg.kind());
        match msg {
            WireMessage::Event { event } => self.process_event(event),
            WireMessage::Operation { operation } => self.process_operation(operation),
            WireMessage::PresenceUpdate { presence } => self.process_presence(presence),
            WireMessage::SyncResponse { session_id, events, version } => {
                self.handle_sync_response(&session_id, events, version);
            }
            WireMessage::Conflict { conflict } => self.process_conflict(conflict),
            WireMessage::JoinSession { user, .. } => {
                if let Err(e) = self.registry.apply_join(user) {
                    warn!("Join rejected: {}", e);
                }
            }
            WireMessage::LeaveSession { user_id, .. } => self.remove_participant(&user_id),
            WireMessage::Heartbeat { timestamp } => {
                debug!("Relay heartbeat at {}", timestamp);
            }
            WireMessage::SyncRequest { session_id, from_version } => {
                // Relay-bound frame; a client receiving one is a protocol
                // violation, logged and dropped.
                warn!("Unexpected SYNC_REQUEST for {} from version {}", session_id, from_version);
            }
            WireMessage::Error { error, code } => {
                error!("Relay error (code {:?}): {}", code, error);
                self.notifier.sync_error(error);
            }
        }
    }

    /// Apply an inbound event: acknowledge own echoes, reject stale
    /// versions, park conflicts, otherwise dispatch by type and record.
    fn process_event(&mut self, event: SessionEvent) {
        // The relay fans our own events back to us; that is the
        // acknowledgement. Reconcile, never re-apply.
        if event.author_id == self.registry.local_user_id() && self.log.is_applied(event.id) {
            debug!("Event {} acknowledged by relay", event.id);
            self.log.acknowledge(event.id);
            return;
        }

        if !self.log.admits(&event) {
            return;
        }

        let strategy = ConflictStrategy::from(self.registry.session().settings.conflict_resolution_mode);
        if let Some(record) = self.conflicts.detect(
            &event,
            self.log.base_version(),
            self.registry.local_user_id(),
            strategy,
        ) {
            // Parked in the conflict set, not applied.
            self.notifier.conflict(record.id);
            return;
        }

        self.dispatch_event(&event);
        self.log.record(event);
    }

    fn dispatch_event(&mut self, event: &SessionEvent) {
        match &event.payload {
            EventPayload::UserJoined { user } => {
                if let Err(e) = self.registry.apply_join(user.clone()) {
                    warn!("Ignoring join for {}: {}", user.id, e);
                }
            }
            EventPayload::UserLeft { user_id } => {
                self.remove_participant(user_id);
            }
            EventPayload::TypingStart { user_id } => self.registry.set_typing(user_id, true),
            EventPayload::TypingStop { user_id } => self.registry.set_typing(user_id, false),
            EventPayload::CursorMove { user_id, cursor } => {
                self.registry.set_cursor(user_id, *cursor);
            }
            EventPayload::SessionSync { session } => {
                info!("Applying session sync for {}", session.id);
                self.registry.apply_sync(session.clone());
            }
            EventPayload::MessageSent { .. }
            | EventPayload::MessageEdited { .. }
            | EventPayload::MessageDeleted { .. } => {
                // Chat history lives in the event log; rendering is the
                // presentation layer's concern.
                self.registry.touch(&event.author_id);
            }
            EventPayload::ConflictDetected { conflict_id, .. } => {
                debug!("Peer flagged conflict {}", conflict_id);
            }
        }
    }

    /// Apply a remote operation to the confirmed document and rewrite the
    /// local pending queue against it. An echo of our own operation is the
    /// acknowledgement and moves it from tentative to confirmed.
    fn process_operation(&mut self, operation: Operation) {
        if operation.author_id == self.registry.local_user_id() {
            if let Some(acked) = self.pending_ops.acknowledge(operation.id) {
                debug!("Operation {} acknowledged by relay", acked.id);
                self.confirmed_text = ot::apply_operation(&self.confirmed_text, &acked);
            } else {
                warn!("Acknowledgement for unknown operation {}", operation.id);
            }
            return;
        }

        self.confirmed_text = ot::apply_operation(&self.confirmed_text, &operation);
        // Must run even when the queue is empty, preserving order.
        self.pending_ops.transform_against(&operation);
        self.registry.touch(&operation.author_id);
    }

    fn process_presence(&mut self, presence: PresenceInfo) {
        if presence.user_id == self.registry.local_user_id() {
            return;
        }
        self.registry.touch(&presence.user_id);
        self.presence.apply_remote(presence);
    }

    fn process_conflict(&mut self, conflict: ConflictRecord) {
        let id = conflict.id;
        let resolved = conflict.resolved;
        self.conflicts.track(conflict);
        if !resolved {
            self.notifier.conflict(id);
        }
    }

    /// Replay a sync response through the normal event path, then adopt
    /// the relay's version as the new base. Replay is idempotent: already
    /// applied events are skipped via the applied-id set.
    fn handle_sync_response(&mut self, session_id: &str, events: Vec<SessionEvent>, version: u64) {
        if session_id != self.registry.session().id {
            warn!("Sync response for foreign session {}, dropping", session_id);
            return;
        }
        info!("Replaying {} events up to version {}", events.len(), version);
        for event in events {
            self.process_event(event);
        }
        self.log.set_base_version(version);
    }

    fn remove_participant(&mut self, user_id: &str) {
        let before = self.registry.session().participant(user_id).is_some();
        let remaining = self.registry.apply_leave(user_id);
        self.presence.remove(user_id);
        if before {
            self.notifier.info(format!("{} left the session", user_id));
        }
        if remaining == 0 {
            info!("Last participant left; session {} is now inactive locally", self.registry.session().id);
        }
    }

    // ── Event plumbing ──────────────────────────────────────────────────

    /// Build, optimistically apply, and hand back a locally authored event.
    fn emit_event(&mut self, payload: EventPayload) -> Vec<WireMessage> {
        let event = SessionEvent::new(
            self.registry.session().id.clone(),
            self.registry.local_user_id().to_string(),
            self.log.next_version(),
            payload,
        );
        // Optimistic local apply; reconciled when the relay echoes it.
        self.dispatch_event(&event);
        self.log.record(event.clone());
        self.log.push_pending(event.clone());
        vec![WireMessage::Event { event }]
    }

    // ── Read accessors (snapshots only) ─────────────────────────────────

    pub fn session(&self) -> &Session {
        self.registry.session()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.registry.participants()
    }

    pub fn history(&self) -> Vec<SessionEvent> {
        self.log.history().cloned().collect()
    }

    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.all().cloned().collect()
    }

    pub fn unresolved_conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.unresolved().cloned().collect()
    }

    pub fn peer_presence(&self) -> Vec<PresenceInfo> {
        self.presence.peers().cloned().collect()
    }

    pub fn presence_status_of(&self, user_id: &str) -> Option<crate::models::PresenceStatus> {
        self.presence.status_of(user_id)
    }

    pub fn base_version(&self) -> u64 {
        self.log.base_version()
    }

    /// Document state confirmed by the relay.
    pub fn confirmed_document(&self) -> &str {
        &self.confirmed_text
    }

    /// Tentative document state: confirmed text with the pending local
    /// operations applied on top, in authoring order. Contiguous runs by
    /// the same author collapse into one apply.
    pub fn document(&self) -> String {
        let mut text = self.confirmed_text.clone();
        for op in ot::compose_operations(self.pending_ops.iter().cloned().collect()) {
            text = ot::apply_operation(&text, &op);
        }
        text
    }

    pub fn pending_operation_count(&self) -> usize {
        self.pending_ops.len()
    }

    pub fn pending_event_count(&self) -> usize {
        self.log.pending_len()
    }
}
