//! Message synchronization engine.
//!
//! Merges REST-paginated history with channel-pushed messages into one
//! ordered, deduplicated log. Merge is always append + sort by id-set
//! union, never replace, so late pages and channel pushes may arrive in
//! any order.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use telecare_api::models::MessageDraft;
use telecare_api::PortalStore;
use telecare_shared::events::{ChatMessage, OutboundEvent};
use telecare_shared::{CoreError, EntityId, IdentityContext};
use telecare_transport::TransportChannel;

/// Pagination metadata from the most recent history fetch.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

pub struct MessageSyncEngine {
    identity: IdentityContext,
    transport: Arc<dyn TransportChannel>,
    store: Arc<dyn PortalStore>,
    /// Ascending by timestamp.
    log: Vec<ChatMessage>,
    /// Every id ever observed; cleared only on logout.
    seen: HashSet<EntityId>,
    meta: Option<PageMeta>,
}

impl MessageSyncEngine {
    pub fn new(
        identity: IdentityContext,
        transport: Arc<dyn TransportChannel>,
        store: Arc<dyn PortalStore>,
    ) -> Self {
        Self {
            identity,
            transport,
            store,
            log: Vec::new(),
            seen: HashSet::new(),
            meta: None,
        }
    }

    /// The full ordered log.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.log
    }

    /// The log filtered to one conversation.
    pub fn conversation_with(&self, peer: &EntityId) -> Vec<&ChatMessage> {
        self.log
            .iter()
            .filter(|m| m.peer_of(&self.identity.user_id) == peer)
            .collect()
    }

    pub fn page_meta(&self) -> Option<PageMeta> {
        self.meta
    }

    /// Fetch one page of history with `peer` and merge it in. Returns
    /// how many messages were new; ids already observed are skipped, so
    /// a page racing a channel push is harmless.
    pub async fn fetch_history(
        &mut self,
        peer: &EntityId,
        page: u32,
        limit: u32,
    ) -> Result<usize, CoreError> {
        let fetched = self.store.fetch_messages(peer, page, limit).await?;

        let mut merged = 0;
        for message in fetched.messages {
            let Some(id) = message.id.clone() else {
                warn!("History page contained a message without an id, skipping");
                continue;
            };
            if self.seen.insert(id) {
                self.log.push(message);
                merged += 1;
            }
        }
        if merged > 0 {
            self.log.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        }
        self.meta = Some(PageMeta {
            total: fetched.total,
            page: fetched.page,
            limit: fetched.limit,
        });

        debug!(peer = %peer.short(), page, merged, "History page merged");
        Ok(merged)
    }

    /// Optimistic send: validate, append a provisional entry, persist,
    /// then assign the store's id and re-broadcast the finalized
    /// message to the peer.
    ///
    /// On persistence failure the provisional entry is intentionally
    /// left in place and the error is surfaced to the caller.
    pub async fn send(
        &mut self,
        receiver: &str,
        body: String,
        attachment_refs: Vec<String>,
    ) -> Result<ChatMessage, CoreError> {
        let receiver_id = EntityId::parse(receiver)?;
        if !self.transport.is_connected() {
            return Err(CoreError::TransportUnavailable);
        }

        let timestamp = Utc::now();
        let provisional = ChatMessage {
            id: None,
            sender_id: self.identity.user_id.clone(),
            receiver_id: receiver_id.clone(),
            body: body.clone(),
            attachment_refs: attachment_refs.clone(),
            timestamp,
        };
        let at = self.insert_ordered(provisional);

        let draft = MessageDraft {
            receiver_id: receiver_id.clone(),
            body,
            attachment_refs,
            timestamp,
        };
        let persisted = match self.store.persist_message(&draft).await {
            Ok(persisted) => persisted,
            Err(e) => {
                warn!(error = %e, "Message persist failed, provisional entry kept");
                return Err(e.into());
            }
        };

        // Reconcile exactly the entry this send inserted. The log
        // cannot shift underneath the await: the engine is exclusively
        // borrowed for the whole send.
        self.log[at] = persisted.clone();
        if let Some(id) = persisted.id.clone() {
            self.seen.insert(id);
        }

        // Push to the peer over the channel; the message is already
        // durable, so a failed emit is only logged.
        if let Err(e) = self.transport.emit(OutboundEvent::Message(persisted.clone())) {
            warn!(error = %e, "Finalized message emit failed");
        }

        debug!(receiver = %receiver_id.short(), "Message sent");
        Ok(persisted)
    }

    /// A `message` event arrived over the channel. Dropped when the id
    /// is missing or already observed (REST echoes and channel pushes
    /// can both deliver the same message). Returns true when inserted.
    pub fn on_channel_message(&mut self, message: ChatMessage) -> bool {
        let Some(id) = message.id.clone() else {
            warn!("Channel message without an id, dropping");
            return false;
        };
        if !self.seen.insert(id) {
            debug!("Duplicate channel message, dropping");
            return false;
        }
        self.insert_ordered(message);
        true
    }

    /// Insert keeping the log ordered; equal timestamps keep arrival
    /// order. Returns the insertion index.
    fn insert_ordered(&mut self, message: ChatMessage) -> usize {
        let at = self
            .log
            .partition_point(|m| m.timestamp <= message.timestamp);
        self.log.insert(at, message);
        at
    }

    /// Logout/reset: drop the log, the id set and pagination state.
    pub fn reset(&mut self) {
        self.log.clear();
        self.seen.clear();
        self.meta = None;
    }
}
