use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::SyncError;
use crate::models::{
    Participant, ParticipantRole, PresenceStatus, Session, SessionOptions,
};

/// Session, participant, role and permission state for one session.
/// Mutated only by the engine in response to events and local API calls;
/// collaborators read snapshots.
pub struct SessionRegistry {
    session: Session,
    local_user_id: String,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Create a fresh session owned by `owner`, with caller-supplied
    /// permission/setting overrides merged onto the defaults.
    pub fn create(name: impl Into<String>, options: SessionOptions, mut owner: Participant, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        owner.role = ParticipantRole::Owner;
        owner.status = PresenceStatus::Online;
        let session = Session {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            owner_id: owner.id.clone(),
            participants: vec![owner.clone()],
            permissions: options.permissions.unwrap_or_default(),
            settings: options.settings.unwrap_or_default(),
            created_at: now,
            updated_at: now,
            is_active: true,
            expires_at: options.expires_at,
            share_url: None,
        };
        info!("Created session '{}' ({}) owned by {}", session.name, session.id, owner.id);
        Self {
            session,
            local_user_id: owner.id,
            clock,
        }
    }

    /// Adopt an existing session on join; the local user is added
    /// optimistically before the relay confirms.
    pub fn join(mut session: Session, local_user: Participant, clock: Arc<dyn Clock>) -> Self {
        let local_user_id = local_user.id.clone();
        if session.participant(&local_user_id).is_none() {
            session.participants.push(local_user);
        }
        session.updated_at = clock.now();
        Self {
            session,
            local_user_id,
            clock,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Snapshot of the participant list for external readers.
    pub fn participants(&self) -> Vec<Participant> {
        self.session.participants.clone()
    }

    /// Add a participant. Re-joins refresh the existing entry instead of
    /// duplicating it.
    pub fn apply_join(&mut self, participant: Participant) -> Result<(), SyncError> {
        if let Some(existing) = self.session.participant_mut(&participant.id) {
            *existing = participant;
            self.session.updated_at = self.clock.now();
            return Ok(());
        }
        if self.session.participants.len() >= self.session.settings.max_participants {
            warn!(
                "Session {} is full ({} participants)",
                self.session.id, self.session.settings.max_participants
            );
            return Err(SyncError::State(format!("session {} is full", self.session.id)));
        }
        info!("Participant {} joined session {}", participant.id, self.session.id);
        self.session.participants.push(participant);
        self.session.updated_at = self.clock.now();
        Ok(())
    }

    /// Remove a participant. Returns how many remain; the engine marks the
    /// session inactive locally when the last one leaves.
    pub fn apply_leave(&mut self, user_id: &str) -> usize {
        let before = self.session.participants.len();
        self.session.participants.retain(|p| p.id != user_id);
        if self.session.participants.len() < before {
            info!("Participant {} left session {}", user_id, self.session.id);
            self.session.updated_at = self.clock.now();
        }
        if self.session.participants.is_empty() {
            self.session.is_active = false;
        }
        self.session.participants.len()
    }

    pub fn set_typing(&mut self, user_id: &str, typing: bool) {
        if let Some(participant) = self.session.participant_mut(user_id) {
            participant.is_typing = typing;
            participant.last_seen = self.clock.now();
        }
    }

    pub fn touch(&mut self, user_id: &str) {
        let now = self.clock.now();
        if let Some(participant) = self.session.participant_mut(user_id) {
            participant.last_seen = now;
        }
    }

    pub fn set_cursor(&mut self, user_id: &str, cursor: crate::models::CursorPosition) {
        let now = self.clock.now();
        if let Some(participant) = self.session.participant_mut(user_id) {
            participant.cursor = Some(cursor);
            participant.last_seen = now;
        }
    }

    /// A participant may edit iff their role allows it and the session
    /// permits editing at all.
    pub fn ensure_can_edit(&self, user_id: &str) -> Result<(), SyncError> {
        let participant = self
            .session
            .participant(user_id)
            .ok_or_else(|| SyncError::State(format!("unknown participant {}", user_id)))?;
        if !self.session.permissions.allow_editing {
            return Err(SyncError::Permission(format!("editing is disabled in session {}", self.session.id)));
        }
        if !participant.role.can_edit() {
            return Err(SyncError::Permission(format!("{} is a viewer and cannot edit", user_id)));
        }
        Ok(())
    }

    pub fn ensure_owner(&self, user_id: &str) -> Result<(), SyncError> {
        if self.session.owner_id != user_id {
            return Err(SyncError::Permission(format!("{} is not the owner of session {}", user_id, self.session.id)));
        }
        Ok(())
    }

    pub fn ensure_can_message(&self, user_id: &str) -> Result<(), SyncError> {
        if self.session.participant(user_id).is_none() {
            return Err(SyncError::State(format!("unknown participant {}", user_id)));
        }
        if !self.session.permissions.allow_messaging {
            return Err(SyncError::Permission(format!("messaging is disabled in session {}", self.session.id)));
        }
        Ok(())
    }

    /// Produce a share URL. Permission and setting overrides are
    /// ownership-level grants and rejected for anyone else; non-owners may
    /// still invite when the session allows it.
    pub fn share(&mut self, user_id: &str, overrides: SessionOptions, base_url: &str) -> Result<String, SyncError> {
        let is_owner = self.session.owner_id == user_id;
        if !is_owner && !self.session.permissions.allow_inviting {
            return Err(SyncError::Permission(format!("{} may not invite to session {}", user_id, self.session.id)));
        }
        if let Some(permissions) = overrides.permissions {
            // Permission flags are ownership-level grants, like settings.
            if !is_owner {
                return Err(SyncError::Permission("only the owner may change session permissions".to_string()));
            }
            self.session.permissions = permissions;
        }
        if let Some(settings) = overrides.settings {
            if is_owner {
                self.session.settings = settings;
            } else {
                return Err(SyncError::Permission("only the owner may change session settings".to_string()));
            }
        }
        if let Some(expires_at) = overrides.expires_at {
            self.session.expires_at = Some(expires_at);
        }
        let url = format!("{}/join/{}", base_url.trim_end_matches('/'), self.session.id);
        self.session.share_url = Some(url.clone());
        self.session.updated_at = self.clock.now();
        info!("Session {} shared at {}", self.session.id, url);
        Ok(url)
    }

    /// Replace session state wholesale from a SESSION_SYNC event, keeping
    /// the local user present if the snapshot predates their join.
    pub fn apply_sync(&mut self, mut session: Session) {
        if session.participant(&self.local_user_id).is_none() {
            if let Some(local) = self.session.participant(&self.local_user_id) {
                session.participants.push(local.clone());
            }
        }
        self.session = session;
        self.session.updated_at = self.clock.now();
    }

    pub fn is_expired(&self) -> bool {
        self.session.is_expired(self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::models::{SessionPermissions, SessionSettings};

    fn owner() -> Participant {
        Participant::new("me", "Me", "me@example.com", ParticipantRole::Owner)
    }

    fn viewer(id: &str) -> Participant {
        Participant::new(id, id, format!("{}@example.com", id), ParticipantRole::Viewer)
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::create("demo", SessionOptions::default(), owner(), Arc::new(SystemClock))
    }

    #[test]
    fn create_merges_overrides_onto_defaults() {
        let options = SessionOptions {
            settings: Some(SessionSettings {
                max_participants: 2,
                ..Default::default()
            }),
            ..Default::default()
        };
        let reg = SessionRegistry::create("demo", options, owner(), Arc::new(SystemClock));
        assert_eq!(reg.session().settings.max_participants, 2);
        assert!(reg.session().permissions.allow_editing);
        assert_eq!(reg.session().owner_id, "me");
        assert_eq!(reg.participants().len(), 1);
    }

    #[test]
    fn join_and_leave_maintain_participant_set() {
        let mut reg = registry();
        reg.apply_join(viewer("u2")).unwrap();
        assert_eq!(reg.participants().len(), 2);

        // Re-join refreshes rather than duplicates.
        reg.apply_join(viewer("u2")).unwrap();
        assert_eq!(reg.participants().len(), 2);

        assert_eq!(reg.apply_leave("u2"), 1);
        assert!(reg.session().participant("u2").is_none());
    }

    #[test]
    fn session_goes_inactive_when_last_participant_leaves() {
        let mut reg = registry();
        assert_eq!(reg.apply_leave("me"), 0);
        assert!(!reg.session().is_active);
    }

    #[test]
    fn full_session_rejects_new_joins() {
        let options = SessionOptions {
            settings: Some(SessionSettings {
                max_participants: 1,
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut reg = SessionRegistry::create("demo", options, owner(), Arc::new(SystemClock));
        let err = reg.apply_join(viewer("u2")).unwrap_err();
        assert!(matches!(err, SyncError::State(_)));
    }

    #[test]
    fn viewers_cannot_edit() {
        let mut reg = registry();
        reg.apply_join(viewer("u2")).unwrap();
        assert!(reg.ensure_can_edit("me").is_ok());
        assert!(matches!(reg.ensure_can_edit("u2"), Err(SyncError::Permission(_))));
        assert!(matches!(reg.ensure_can_edit("ghost"), Err(SyncError::State(_))));
    }

    #[test]
    fn editing_disabled_blocks_everyone() {
        let options = SessionOptions {
            permissions: Some(SessionPermissions {
                allow_editing: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        let reg = SessionRegistry::create("demo", options, owner(), Arc::new(SystemClock));
        assert!(matches!(reg.ensure_can_edit("me"), Err(SyncError::Permission(_))));
    }

    #[test]
    fn share_produces_url_and_guards_settings() {
        let mut reg = registry();
        reg.apply_join(viewer("u2")).unwrap();

        let url = reg.share("me", SessionOptions::default(), "https://colab.example.com").unwrap();
        assert_eq!(url, format!("https://colab.example.com/join/{}", reg.session().id));
        assert_eq!(reg.session().share_url.as_deref(), Some(url.as_str()));

        // Non-owners may invite but not change settings.
        let overrides = SessionOptions {
            settings: Some(SessionSettings::default()),
            ..Default::default()
        };
        assert!(matches!(reg.share("u2", overrides, "https://colab.example.com"), Err(SyncError::Permission(_))));
    }

    #[test]
    fn non_owners_cannot_rewrite_permissions_when_sharing() {
        let mut reg = registry();
        reg.apply_join(viewer("u2")).unwrap();

        let overrides = SessionOptions {
            permissions: Some(SessionPermissions {
                allow_editing: false,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = reg.share("u2", overrides, "https://colab.example.com").unwrap_err();
        assert!(matches!(err, SyncError::Permission(_)));
        // The session's grants are untouched.
        assert!(reg.session().permissions.allow_editing);
        assert!(reg.session().share_url.is_none());
    }
}
