//! Presence tracking.
//!
//! Maintains the online/offline peer sets from `userStatus` broadcasts.
//! Both sets are replaced wholesale on every broadcast, never patched,
//! so a dropped broadcast is corrected by the next one.

use std::collections::HashMap;

use tracing::debug;

use telecare_shared::events::{PresenceEntry, UserStatusPayload};
use telecare_shared::EntityId;

/// Tracks the last broadcast snapshot of peer presence.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: HashMap<EntityId, PresenceEntry>,
    offline: HashMap<EntityId, PresenceEntry>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both sets atomically with the latest broadcast.
    pub fn apply_broadcast(&mut self, status: UserStatusPayload) {
        debug!(
            online = status.online_users.len(),
            offline = status.offline_users.len(),
            "Applying presence broadcast"
        );

        self.online = status
            .online_users
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
        self.offline = status
            .offline_users
            .into_iter()
            .map(|entry| (entry.id.clone(), entry))
            .collect();
    }

    pub fn is_online(&self, peer: &EntityId) -> bool {
        self.online.contains_key(peer)
    }

    /// Look up a peer in either set.
    pub fn entry(&self, peer: &EntityId) -> Option<&PresenceEntry> {
        self.online.get(peer).or_else(|| self.offline.get(peer))
    }

    pub fn online_peers(&self) -> Vec<&PresenceEntry> {
        self.online.values().collect()
    }

    pub fn offline_peers(&self) -> Vec<&PresenceEntry> {
        self.offline.values().collect()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Forget everything (logout/reset).
    pub fn clear(&mut self) {
        self.online.clear();
        self.offline.clear();
    }
}
