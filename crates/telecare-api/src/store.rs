//! The `PortalStore` seam.
//!
//! Every engine that talks to the external store goes through this
//! trait so tests can substitute the in-memory implementation.

use async_trait::async_trait;

use telecare_shared::events::ChatMessage;
use telecare_shared::EntityId;

use crate::error::Result;
use crate::models::{
    MessageDraft, MessagePage, NotificationDraft, NotificationPage, NotificationRecord,
    PartnerPage,
};

#[async_trait]
pub trait PortalStore: Send + Sync {
    /// Fetch one page of chat history between the current identity and
    /// `peer`, newest pages first.
    async fn fetch_messages(&self, peer: &EntityId, page: u32, limit: u32)
        -> Result<MessagePage>;

    /// Persist an outgoing message; the store assigns the id.
    async fn persist_message(&self, draft: &MessageDraft) -> Result<ChatMessage>;

    /// List unique conversation partners.
    async fn list_partners(&self, page: u32, limit: u32) -> Result<PartnerPage>;

    /// List notifications addressed to the current identity.
    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage>;

    /// Persist a locally synthesized notification; returns the store's
    /// canonical copy.
    async fn persist_notification(&self, draft: &NotificationDraft)
        -> Result<NotificationRecord>;

    /// Mark a notification acknowledged; returns the updated record.
    async fn acknowledge_notification(&self, id: &EntityId) -> Result<NotificationRecord>;
}
