//! Derived conversation list.
//!
//! One entry per distinct peer, recomputed from message arrivals,
//! partner listings and presence broadcasts; never stored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use telecare_api::models::ConversationPartner;
use telecare_shared::events::ChatMessage;
use telecare_shared::EntityId;
use telecare_transport::PresenceTracker;

/// Per-peer summary driving the contact list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub peer_id: EntityId,
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub last_message_body: Option<String>,
    pub last_message_timestamp: Option<DateTime<Utc>>,
    pub is_online: bool,
}

#[derive(Debug)]
pub struct ConversationList {
    self_id: EntityId,
    entries: HashMap<EntityId, Conversation>,
}

impl ConversationList {
    pub fn new(self_id: EntityId) -> Self {
        Self {
            self_id,
            entries: HashMap::new(),
        }
    }

    /// Fold a message into the list, creating the peer's entry on first
    /// contact. Stale messages (older than the recorded last message)
    /// do not move the summary backwards.
    pub fn apply_message(&mut self, message: &ChatMessage, presence: &PresenceTracker) {
        let peer_id = message.peer_of(&self.self_id).clone();
        let entry = self.entries.entry(peer_id.clone()).or_insert_with(|| {
            let known = presence.entry(&peer_id);
            Conversation {
                display_name: known
                    .map(|p| p.display_name.clone())
                    .unwrap_or_else(|| peer_id.to_string()),
                avatar_ref: known.and_then(|p| p.avatar_ref.clone()),
                is_online: presence.is_online(&peer_id),
                peer_id,
                last_message_body: None,
                last_message_timestamp: None,
            }
        });

        if entry
            .last_message_timestamp
            .map(|last| message.timestamp >= last)
            .unwrap_or(true)
        {
            entry.last_message_body = Some(message.body.clone());
            entry.last_message_timestamp = Some(message.timestamp);
        }
    }

    /// Republish derived online flags after a presence broadcast, and
    /// pick up fresher display names/avatars.
    pub fn apply_presence(&mut self, presence: &PresenceTracker) {
        for (peer_id, entry) in self.entries.iter_mut() {
            entry.is_online = presence.is_online(peer_id);
            if let Some(known) = presence.entry(peer_id) {
                entry.display_name = known.display_name.clone();
                if known.avatar_ref.is_some() {
                    entry.avatar_ref = known.avatar_ref.clone();
                }
            }
        }
    }

    /// Merge a partner from the portal's conversation listing.
    pub fn upsert_partner(&mut self, partner: ConversationPartner, presence: &PresenceTracker) {
        let entry = self
            .entries
            .entry(partner.id.clone())
            .or_insert_with(|| Conversation {
                peer_id: partner.id.clone(),
                display_name: partner.display_name.clone(),
                avatar_ref: None,
                last_message_body: None,
                last_message_timestamp: None,
                is_online: false,
            });

        entry.display_name = partner.display_name;
        if partner.avatar_ref.is_some() {
            entry.avatar_ref = partner.avatar_ref;
        }
        if partner.last_message_timestamp > entry.last_message_timestamp {
            entry.last_message_body = partner.last_message_body;
            entry.last_message_timestamp = partner.last_message_timestamp;
        }
        entry.is_online = presence.is_online(&entry.peer_id);
    }

    /// Snapshot ordered by last message, newest first; peers with no
    /// messages yet sort last.
    pub fn sorted(&self) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self.entries.values().collect();
        list.sort_by(|a, b| match (b.last_message_timestamp, a.last_message_timestamp) {
            (Some(tb), Some(ta)) => tb.cmp(&ta),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => a.peer_id.cmp(&b.peer_id),
        });
        list
    }

    pub fn get(&self, peer: &EntityId) -> Option<&Conversation> {
        self.entries.get(peer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecare_shared::events::{PresenceEntry, UserStatusPayload};
    use telecare_shared::Role;

    const ME: &str = "64b7f3a2c9e1d805a4f2b391";
    const P1: &str = "64b7f3a2c9e1d805a4f2b392";
    const P2: &str = "64b7f3a2c9e1d805a4f2b393";

    fn eid(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn msg(from: &str, to: &str, body: &str, at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id: Some(eid("64b7f3a2c9e1d805a4f2b3ff")),
            sender_id: eid(from),
            receiver_id: eid(to),
            body: body.to_string(),
            attachment_refs: vec![],
            timestamp: at,
        }
    }

    fn presence_online(ids: &[&str]) -> PresenceTracker {
        let mut presence = PresenceTracker::new();
        presence.apply_broadcast(UserStatusPayload {
            online_users: ids
                .iter()
                .map(|id| PresenceEntry {
                    id: eid(id),
                    display_name: format!("peer-{}", &id[20..]),
                    role: Role::Patient,
                    avatar_ref: None,
                })
                .collect(),
            offline_users: vec![],
        });
        presence
    }

    #[test]
    fn test_one_entry_per_peer() {
        let mut list = ConversationList::new(eid(ME));
        let presence = presence_online(&[P1]);
        let now = Utc::now();

        list.apply_message(&msg(P1, ME, "hello", now), &presence);
        list.apply_message(&msg(ME, P1, "hi back", now + chrono::Duration::seconds(1)), &presence);

        assert_eq!(list.len(), 1);
        let convo = list.get(&eid(P1)).unwrap();
        assert_eq!(convo.last_message_body.as_deref(), Some("hi back"));
    }

    #[test]
    fn test_sorted_newest_first_none_last() {
        let mut list = ConversationList::new(eid(ME));
        let presence = presence_online(&[P1, P2]);
        let now = Utc::now();

        list.apply_message(&msg(P1, ME, "old", now - chrono::Duration::minutes(5)), &presence);
        list.apply_message(&msg(P2, ME, "new", now), &presence);
        list.upsert_partner(
            ConversationPartner {
                id: eid("64b7f3a2c9e1d805a4f2b394"),
                display_name: "Quiet".into(),
                role: Role::Patient,
                avatar_ref: None,
                last_message_body: None,
                last_message_timestamp: None,
            },
            &presence,
        );

        let sorted = list.sorted();
        assert_eq!(sorted[0].peer_id, eid(P2));
        assert_eq!(sorted[1].peer_id, eid(P1));
        assert!(sorted[2].last_message_timestamp.is_none());
    }

    #[test]
    fn test_presence_flags_follow_latest_broadcast() {
        let mut list = ConversationList::new(eid(ME));
        let presence = presence_online(&[P1]);
        list.apply_message(&msg(P1, ME, "x", Utc::now()), &presence);
        assert!(list.get(&eid(P1)).unwrap().is_online);

        let gone = presence_online(&[P2]);
        list.apply_presence(&gone);
        assert!(!list.get(&eid(P1)).unwrap().is_online);
    }

    #[test]
    fn test_stale_message_does_not_rewind_summary() {
        let mut list = ConversationList::new(eid(ME));
        let presence = presence_online(&[P1]);
        let now = Utc::now();

        list.apply_message(&msg(P1, ME, "latest", now), &presence);
        list.apply_message(&msg(P1, ME, "from history", now - chrono::Duration::hours(1)), &presence);

        assert_eq!(
            list.get(&eid(P1)).unwrap().last_message_body.as_deref(),
            Some("latest")
        );
    }
}
