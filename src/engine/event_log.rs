use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::SessionEvent;

/// Ordered event bookkeeping for one session: the recent-history ring
/// buffer, the unacknowledged pending queue, and the applied-id set that
/// makes sync replay idempotent.
///
/// The history is a presentation/debug aid; the relay holds the authority
/// record.
pub struct EventLog {
    history: VecDeque<SessionEvent>,
    pending: VecDeque<SessionEvent>,
    applied: HashSet<Uuid>,
    base_version: u64,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity.min(1024)),
            pending: VecDeque::new(),
            applied: HashSet::new(),
            base_version: 0,
            capacity,
        }
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    /// Authoritative version from a sync response overrides the local one.
    pub fn set_base_version(&mut self, version: u64) {
        self.base_version = version;
    }

    /// Version assigned to the next locally created event.
    pub fn next_version(&self) -> u64 {
        self.base_version + 1
    }

    /// Whether an inbound event may be applied. Events below the applied
    /// base version or already seen ids are rejected.
    pub fn admits(&self, event: &SessionEvent) -> bool {
        if event.version < self.base_version {
            warn!(
                "Rejecting event {} at version {} below base version {}",
                event.id, event.version, self.base_version
            );
            return false;
        }
        if self.applied.contains(&event.id) {
            debug!("Event {} already applied, skipping replay", event.id);
            return false;
        }
        true
    }

    /// Record an applied event: append to history (evicting the oldest past
    /// capacity), remember its id, and advance the base version.
    pub fn record(&mut self, event: SessionEvent) {
        self.applied.insert(event.id);
        if event.version > self.base_version {
            self.base_version = event.version;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }

    pub fn history(&self) -> impl Iterator<Item = &SessionEvent> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Queue an event authored locally while the transport is down.
    pub fn push_pending(&mut self, event: SessionEvent) {
        self.pending.push_back(event);
    }

    /// Take all queued events in original submission order.
    pub fn drain_pending(&mut self) -> Vec<SessionEvent> {
        self.pending.drain(..).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Mark a locally authored event as confirmed by the relay.
    pub fn acknowledge(&mut self, id: Uuid) {
        self.applied.insert(id);
        if let Some(event) = self.history.iter_mut().find(|e| e.id == id) {
            event.acknowledged = true;
        }
        if let Some(idx) = self.pending.iter().position(|e| e.id == id) {
            self.pending.remove(idx);
        }
    }

    pub fn is_applied(&self, id: Uuid) -> bool {
        self.applied.contains(&id)
    }
}
