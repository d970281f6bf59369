use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::models::{
    ConflictRecord, Operation, Participant, PresenceInfo, PresencePatch, Session, SessionEvent,
    SessionOptions, WireMessage,
};
use crate::notify::{Notification, Notifier};
use crate::profile::{ProfileStore, StoredProfile};
use crate::transport::{Transport, TransportStream};

/// Client-side entry point: one connection, at most one active session
/// engine, and the notification stream a presentation layer renders.
///
/// All state mutation happens on the caller's task, one inbound message or
/// local call at a time.
pub struct SyncClient {
    config: SyncConfig,
    conn: ConnectionManager,
    engine: Option<SyncEngine>,
    inbound: Option<Box<dyn TransportStream>>,
    current_user: Option<Participant>,
    profile_store: Option<Box<dyn ProfileStore>>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
}

impl SyncClient {
    pub fn new(config: SyncConfig, transport: Box<dyn Transport>) -> (Self, UnboundedReceiver<Notification>) {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: SyncConfig,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, UnboundedReceiver<Notification>) {
        let (notifier, rx) = Notifier::channel();
        let conn = ConnectionManager::new(transport, config.clone(), notifier.clone());
        (
            Self {
                config,
                conn,
                engine: None,
                inbound: None,
                current_user: None,
                profile_store: None,
                clock,
                notifier,
            },
            rx,
        )
    }

    pub fn set_profile_store(&mut self, store: Box<dyn ProfileStore>) {
        self.profile_store = Some(store);
    }

    /// Restore the stored identity, if any. Called once at startup.
    pub async fn restore_identity(&mut self) -> Result<Option<Participant>, SyncError> {
        let Some(store) = &self.profile_store else {
            return Ok(None);
        };
        match store.load().await? {
            Some(profile) => {
                info!("Restored identity for {}", profile.user.id);
                self.current_user = Some(profile.user.clone());
                Ok(Some(profile.user))
            }
            None => Ok(None),
        }
    }

    pub fn set_current_user(&mut self, user: Participant) {
        self.current_user = Some(user);
    }

    pub fn current_user(&self) -> Option<&Participant> {
        self.current_user.as_ref()
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    pub async fn connect(&mut self) -> Result<(), SyncError> {
        let endpoint = self.config.endpoint.clone();
        if let Some(stream) = self.conn.connect(&endpoint).await? {
            self.inbound = Some(stream);
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) {
        self.inbound = None;
        if let Some(engine) = &mut self.engine {
            engine.cancel_timers();
        }
        self.conn.disconnect().await;
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.conn.status()
    }

    /// Drive the client: pump inbound messages and presence broadcasts,
    /// reconnect with exponential backoff when the transport drops.
    /// Returns when the reconnect policy gives up or after an explicit
    /// disconnect.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        if self.inbound.is_none() {
            self.connect().await?;
        }
        loop {
            self.pump().await;
            if self.conn.status() == ConnectionStatus::Disconnected {
                // Explicit disconnect; nothing to recover.
                return Ok(());
            }
            self.conn.handle_transport_closed();
            if let Some(engine) = &mut self.engine {
                engine.cancel_timers();
            }

            loop {
                if !self.conn.should_retry() {
                    warn!("Giving up after {} reconnect attempts", self.conn.attempts());
                    self.notifier.sync_error("Connection lost and not recovered");
                    return Ok(());
                }
                self.conn.begin_reconnect_wait();
                tokio::time::sleep(self.conn.backoff_delay()).await;
                match self.conn.reconnect().await {
                    Ok(Some(stream)) => {
                        self.inbound = Some(stream);
                        // Catch up on whatever we missed while offline.
                        if let Some(engine) = &self.engine {
                            let request = engine.request_sync();
                            self.conn.send(request).await;
                        }
                        break;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Reconnect failed: {}", e);
                    }
                }
            }
        }
    }

    /// Pump one connection until its stream ends. Protocol errors are
    /// dropped per frame; transport errors end the pump.
    async fn pump(&mut self) {
        let Some(mut stream) = self.inbound.take() else {
            return;
        };
        loop {
            let presence_wait = self.next_presence_wait();
            tokio::select! {
                frame = stream.next_message() => {
                    match frame {
                        Some(Ok(msg)) => self.dispatch_inbound(msg),
                        Some(Err(SyncError::Protocol(e))) => {
                            // One bad frame never stops the loop.
                            error!("Dropping malformed frame: {}", e);
                        }
                        Some(Err(e)) => {
                            error!("Transport failure: {}", e);
                            return;
                        }
                        None => {
                            info!("Transport stream ended");
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep(presence_wait) => {
                    self.flush_presence().await;
                }
            }
        }
    }

    fn dispatch_inbound(&mut self, msg: WireMessage) {
        match &mut self.engine {
            Some(engine) => engine.handle_message(msg),
            None => debug!("No active session, dropping {} frame", msg.kind()),
        }
    }

    fn next_presence_wait(&self) -> Duration {
        let Some(deadline) = self.engine.as_ref().and_then(|e| e.next_presence_deadline()) else {
            // Nothing scheduled; sleep long, a local call reschedules us.
            return Duration::from_secs(3600);
        };
        let now = self.clock.now();
        (deadline - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Send the debounced presence broadcast if its window has elapsed.
    pub async fn flush_presence(&mut self) {
        let Some(engine) = &mut self.engine else { return };
        if let Some(frame) = engine.due_presence_broadcast() {
            self.conn.send(frame).await;
        }
    }

    // ── Session API ─────────────────────────────────────────────────────

    /// Create a session owned by the current user. Requires an identity;
    /// the initial session-sync event goes out (or queues) immediately.
    pub async fn create_session(&mut self, name: &str, options: SessionOptions) -> Result<Session, SyncError> {
        let user = self
            .current_user
            .clone()
            .ok_or_else(|| SyncError::State("no current user set".to_string()))?;
        if self.engine.is_some() {
            return Err(SyncError::State("already in a session".to_string()));
        }
        let settings_changed = options.settings.is_some();
        let (engine, outbound) = SyncEngine::create_session(
            name,
            options,
            user,
            &self.config,
            self.clock.clone(),
            self.notifier.clone(),
        );
        let session = engine.session().clone();
        self.engine = Some(engine);
        self.send_all(outbound).await;
        if settings_changed {
            self.persist_profile(Some(session.id.clone())).await;
        }
        Ok(session)
    }

    /// Join an existing session. Requires an active transport.
    pub async fn join_session(&mut self, session: Session) -> Result<(), SyncError> {
        let user = self
            .current_user
            .clone()
            .ok_or_else(|| SyncError::State("no current user set".to_string()))?;
        if !self.conn.is_connected() {
            return Err(SyncError::State("cannot join a session while disconnected".to_string()));
        }
        if self.engine.is_some() {
            return Err(SyncError::State("already in a session".to_string()));
        }
        if session.is_expired(self.clock.now()) {
            return Err(SyncError::State(format!("session {} has expired", session.id)));
        }
        let (engine, outbound) = SyncEngine::join_session(
            session,
            user,
            &self.config,
            self.clock.clone(),
            self.notifier.clone(),
        );
        self.engine = Some(engine);
        self.send_all(outbound).await;
        Ok(())
    }

    /// Leave the current session and drop its engine. Requires an active
    /// transport so the relay hears about it.
    pub async fn leave_session(&mut self) -> Result<(), SyncError> {
        if !self.conn.is_connected() {
            return Err(SyncError::State("cannot leave a session while disconnected".to_string()));
        }
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| SyncError::State("no active session".to_string()))?;
        let outbound = engine.leave_session();
        self.send_all(outbound).await;
        Ok(())
    }

    /// Produce a share URL for the current session.
    pub async fn share_session(&mut self, overrides: SessionOptions, base_url: &str) -> Result<String, SyncError> {
        let settings_changed = overrides.settings.is_some();
        let (url, outbound, session_id) = {
            let engine = self.engine_mut()?;
            let (url, outbound) = engine.share_session(overrides, base_url)?;
            let session_id = engine.session().id.clone();
            (url, outbound, session_id)
        };
        self.send_all(outbound).await;
        if settings_changed {
            self.persist_profile(Some(session_id)).await;
        }
        Ok(url)
    }

    pub async fn send_chat_message(&mut self, content: &str) -> Result<(), SyncError> {
        let outbound = self.engine_mut()?.send_message(content)?;
        self.send_all(outbound).await;
        Ok(())
    }

    pub async fn set_typing(&mut self, typing: bool) -> Result<(), SyncError> {
        let outbound = self.engine_mut()?.set_typing(typing);
        self.send_all(outbound).await;
        Ok(())
    }

    pub async fn submit_operation(&mut self, operation: Operation) -> Result<(), SyncError> {
        let outbound = self.engine_mut()?.submit_operation(operation)?;
        self.send_all(outbound).await;
        Ok(())
    }

    /// Merge a partial presence update; the broadcast goes out after the
    /// debounce window, coalescing rapid calls.
    pub fn update_presence(&mut self, patch: PresencePatch) -> Result<(), SyncError> {
        self.engine_mut()?.update_presence(patch);
        Ok(())
    }

    pub async fn resolve_conflict(&mut self, conflict_id: Uuid, payload: Value) -> Result<(), SyncError> {
        let outbound = self.engine_mut()?.resolve_conflict(conflict_id, payload)?;
        self.send_all(outbound).await;
        Ok(())
    }

    pub async fn request_sync(&mut self) -> Result<(), SyncError> {
        let request = self.engine_mut()?.request_sync();
        self.conn.send(request).await;
        Ok(())
    }

    // ── Read accessors ──────────────────────────────────────────────────

    pub fn session(&self) -> Option<&Session> {
        self.engine.as_ref().map(|e| e.session())
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.engine.as_ref().map(|e| e.participants()).unwrap_or_default()
    }

    pub fn history(&self) -> Vec<SessionEvent> {
        self.engine.as_ref().map(|e| e.history()).unwrap_or_default()
    }

    pub fn conflicts(&self) -> Vec<ConflictRecord> {
        self.engine.as_ref().map(|e| e.conflicts()).unwrap_or_default()
    }

    pub fn peer_presence(&self) -> Vec<PresenceInfo> {
        self.engine.as_ref().map(|e| e.peer_presence()).unwrap_or_default()
    }

    pub fn document(&self) -> Option<String> {
        self.engine.as_ref().map(|e| e.document())
    }

    async fn send_all(&mut self, frames: Vec<WireMessage>) {
        for frame in frames {
            self.conn.send(frame).await;
        }
    }

    fn engine_mut(&mut self) -> Result<&mut SyncEngine, SyncError> {
        self.engine
            .as_mut()
            .ok_or_else(|| SyncError::State("no active session".to_string()))
    }

    async fn persist_profile(&self, last_session_id: Option<String>) {
        let (Some(store), Some(user)) = (&self.profile_store, &self.current_user) else {
            return;
        };
        let profile = StoredProfile {
            user: user.clone(),
            last_session_id,
            preferred_settings: self.session().map(|s| s.settings),
        };
        if let Err(e) = store.save(&profile).await {
            // Persistence is best effort; the session keeps running.
            error!("Failed to persist profile: {}", e);
        }
    }
}
