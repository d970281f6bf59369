use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::Clock;
use crate::models::{PresenceInfo, PresencePatch, PresenceStatus};

/// Tracks ephemeral presence for the local user and every peer in the
/// session. Local updates are debounced before broadcast; peer updates are
/// replaced wholesale, last one wins.
pub struct PresenceTracker {
    local: PresenceInfo,
    remote: HashMap<String, PresenceInfo>,
    debounce: Duration,
    stale_after: Duration,
    broadcast_due: Option<DateTime<Utc>>,
    clock: Arc<dyn Clock>,
}

impl PresenceTracker {
    pub fn new(local_user_id: impl Into<String>, debounce_ms: u64, stale_secs: u64, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        Self {
            local: PresenceInfo::new(local_user_id, now),
            remote: HashMap::new(),
            debounce: Duration::milliseconds(debounce_ms as i64),
            stale_after: Duration::seconds(stale_secs as i64),
            broadcast_due: None,
            clock,
        }
    }

    /// Merge a partial update into the local presence record; fields absent
    /// from the patch keep their last known value. Schedules a broadcast on
    /// the debounce window unless one is already pending.
    pub fn update_local(&mut self, patch: PresencePatch) {
        if let Some(cursor) = patch.cursor {
            self.local.cursor = Some(cursor);
        }
        if let Some(selection) = patch.selection {
            self.local.selection = Some(selection);
        }
        if let Some(viewport) = patch.viewport {
            self.local.viewport = Some(viewport);
        }
        self.local.last_activity = patch.last_activity.unwrap_or_else(|| self.clock.now());

        if self.broadcast_due.is_none() {
            self.broadcast_due = Some(self.clock.now() + self.debounce);
            debug!("Presence broadcast scheduled for {}", self.local.user_id);
        }
    }

    /// Take the local presence for broadcast once the debounce window has
    /// elapsed. Returns `None` while the window is still open or nothing
    /// is scheduled.
    pub fn take_due_broadcast(&mut self) -> Option<PresenceInfo> {
        let due = self.broadcast_due?;
        if self.clock.now() < due {
            return None;
        }
        self.broadcast_due = None;
        Some(self.local.clone())
    }

    /// Earliest instant a broadcast becomes due, for the driving loop.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.broadcast_due
    }

    /// Drop any scheduled broadcast. Presence is not retried on disconnect.
    pub fn cancel_pending(&mut self) {
        if self.broadcast_due.take().is_some() {
            debug!("Cancelled pending presence broadcast");
        }
    }

    /// Replace a peer's presence wholesale; the last update wins.
    pub fn apply_remote(&mut self, presence: PresenceInfo) {
        self.remote.insert(presence.user_id.clone(), presence);
    }

    pub fn remove(&mut self, user_id: &str) {
        self.remote.remove(user_id);
    }

    pub fn local(&self) -> &PresenceInfo {
        &self.local
    }

    pub fn peer(&self, user_id: &str) -> Option<&PresenceInfo> {
        self.remote.get(user_id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PresenceInfo> {
        self.remote.values()
    }

    /// Activity-derived status for a peer. Stale presence means away, never
    /// offline; offline is driven solely by USER_LEFT events.
    pub fn status_of(&self, user_id: &str) -> Option<PresenceStatus> {
        let presence = self.remote.get(user_id)?;
        if self.clock.now() - presence.last_activity > self.stale_after {
            Some(PresenceStatus::Away)
        } else {
            Some(PresenceStatus::Online)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::ManualClock;
    use crate::models::{CursorPosition, Viewport};

    fn tracker(clock: Arc<ManualClock>) -> PresenceTracker {
        PresenceTracker::new("me", 100, 60, clock)
    }

    #[test]
    fn partial_updates_keep_last_known_fields() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        presence.update_local(PresencePatch {
            cursor: Some(CursorPosition { x: 1.0, y: 2.0 }),
            ..Default::default()
        });
        presence.update_local(PresencePatch {
            viewport: Some(Viewport { scroll_x: 0.0, scroll_y: 50.0 }),
            ..Default::default()
        });

        let local = presence.local();
        assert_eq!(local.cursor, Some(CursorPosition { x: 1.0, y: 2.0 }));
        assert_eq!(local.viewport, Some(Viewport { scroll_x: 0.0, scroll_y: 50.0 }));
    }

    #[test]
    fn broadcast_waits_for_debounce_window() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        presence.update_local(PresencePatch::default());
        assert!(presence.take_due_broadcast().is_none());

        clock.advance(Duration::milliseconds(99));
        assert!(presence.take_due_broadcast().is_none());

        clock.advance(Duration::milliseconds(1));
        assert!(presence.take_due_broadcast().is_some());
        // Consumed; nothing further until the next update.
        assert!(presence.take_due_broadcast().is_none());
    }

    #[test]
    fn rapid_updates_coalesce_into_one_broadcast() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        for i in 0..10 {
            presence.update_local(PresencePatch {
                cursor: Some(CursorPosition { x: i as f64, y: 0.0 }),
                ..Default::default()
            });
            clock.advance(Duration::milliseconds(5));
        }
        clock.advance(Duration::milliseconds(100));

        let broadcast = presence.take_due_broadcast().expect("one broadcast due");
        // The coalesced broadcast carries the latest cursor.
        assert_eq!(broadcast.cursor, Some(CursorPosition { x: 9.0, y: 0.0 }));
        assert!(presence.take_due_broadcast().is_none());
    }

    #[test]
    fn cancel_drops_scheduled_broadcast() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        presence.update_local(PresencePatch::default());
        presence.cancel_pending();
        clock.advance(Duration::seconds(1));
        assert!(presence.take_due_broadcast().is_none());
    }

    #[test]
    fn remote_entries_replace_wholesale() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        let mut first = PresenceInfo::new("peer", clock.now());
        first.cursor = Some(CursorPosition { x: 1.0, y: 1.0 });
        first.viewport = Some(Viewport { scroll_x: 5.0, scroll_y: 5.0 });
        presence.apply_remote(first);

        // Second update has no viewport; wholesale replace must drop it.
        let mut second = PresenceInfo::new("peer", clock.now());
        second.cursor = Some(CursorPosition { x: 2.0, y: 2.0 });
        presence.apply_remote(second);

        let peer = presence.peer("peer").unwrap();
        assert_eq!(peer.cursor, Some(CursorPosition { x: 2.0, y: 2.0 }));
        assert!(peer.viewport.is_none());
    }

    #[test]
    fn stale_presence_reports_away_not_offline() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut presence = tracker(clock.clone());

        presence.apply_remote(PresenceInfo::new("peer", clock.now()));
        assert_eq!(presence.status_of("peer"), Some(PresenceStatus::Online));

        clock.advance(Duration::seconds(61));
        assert_eq!(presence.status_of("peer"), Some(PresenceStatus::Away));
        assert_eq!(presence.status_of("stranger"), None);
    }
}
