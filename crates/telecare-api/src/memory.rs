//! In-memory `PortalStore` used by the test suites and for offline
//! development against a stubbed portal.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use telecare_shared::events::ChatMessage;
use telecare_shared::EntityId;

use crate::error::{ApiError, Result};
use crate::models::{
    ConversationPartner, MessageDraft, MessagePage, NotificationDraft, NotificationPage,
    NotificationRecord, PartnerPage,
};
use crate::store::PortalStore;

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<ChatMessage>,
    notifications: Vec<NotificationRecord>,
    partners: Vec<ConversationPartner>,
    next_id: u64,
    fail_writes: bool,
}

/// Stores everything in a `Mutex`; write operations assign sequential
/// 24-hex ids the way the portal's object store does.
#[derive(Debug)]
pub struct InMemoryStore {
    self_id: EntityId,
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new(self_id: EntityId) -> Self {
        Self {
            self_id,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make every write operation fail, to exercise persistence-failure
    /// paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().unwrap().fail_writes = fail;
    }

    pub fn seed_message(&self, message: ChatMessage) {
        self.inner.lock().unwrap().messages.push(message);
    }

    pub fn seed_notification(&self, record: NotificationRecord) {
        self.inner.lock().unwrap().notifications.push(record);
    }

    pub fn seed_partner(&self, partner: ConversationPartner) {
        self.inner.lock().unwrap().partners.push(partner);
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    fn mint_id(inner: &mut Inner) -> EntityId {
        inner.next_id += 1;
        // 24 hex chars, zero padded.
        EntityId::parse(&format!("{:024x}", inner.next_id)).expect("well-formed minted id")
    }
}

#[async_trait]
impl PortalStore for InMemoryStore {
    async fn fetch_messages(
        &self,
        peer: &EntityId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage> {
        let inner = self.inner.lock().unwrap();
        let mut between: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == self.self_id && m.receiver_id == *peer)
                    || (m.sender_id == *peer && m.receiver_id == self.self_id)
            })
            .cloned()
            .collect();
        // Newest first, then slice the requested page.
        between.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = between.len() as u64;
        let start = (page.saturating_sub(1) as usize) * limit as usize;
        let messages: Vec<ChatMessage> =
            between.into_iter().skip(start).take(limit as usize).collect();

        debug!(peer = %peer.short(), page, returned = messages.len(), "fetch_messages");
        Ok(MessagePage {
            messages,
            total,
            page,
            limit,
        })
    }

    async fn persist_message(&self, draft: &MessageDraft) -> Result<ChatMessage> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(ApiError::Rejected("writes disabled".into()));
        }
        let id = Self::mint_id(&mut inner);
        let message = ChatMessage {
            id: Some(id),
            sender_id: self.self_id.clone(),
            receiver_id: draft.receiver_id.clone(),
            body: draft.body.clone(),
            attachment_refs: draft.attachment_refs.clone(),
            timestamp: draft.timestamp,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_partners(&self, page: u32, limit: u32) -> Result<PartnerPage> {
        let inner = self.inner.lock().unwrap();
        let total = inner.partners.len() as u64;
        let start = (page.saturating_sub(1) as usize) * limit as usize;
        let partners = inner
            .partners
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(PartnerPage {
            partners,
            total,
            page,
            limit,
        })
    }

    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage> {
        let inner = self.inner.lock().unwrap();
        let total = inner.notifications.len() as u64;
        let start = (page.saturating_sub(1) as usize) * limit as usize;
        let notifications = inner
            .notifications
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(NotificationPage {
            notifications,
            total,
            page,
            limit,
        })
    }

    async fn persist_notification(
        &self,
        draft: &NotificationDraft,
    ) -> Result<NotificationRecord> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(ApiError::Rejected("writes disabled".into()));
        }
        let id = Self::mint_id(&mut inner);
        let record = NotificationRecord {
            id: Some(id),
            sender_id: draft.sender_id.clone(),
            receiver_id: draft.receiver_id.clone(),
            kind: draft.kind,
            message: draft.message.clone(),
            target_url: draft.target_url.clone(),
            timestamp: draft.timestamp,
            acknowledged: false,
        };
        inner.notifications.push(record.clone());
        Ok(record)
    }

    async fn acknowledge_notification(&self, id: &EntityId) -> Result<NotificationRecord> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(ApiError::Rejected("writes disabled".into()));
        }
        let record = inner
            .notifications
            .iter_mut()
            .find(|n| n.id.as_ref() == Some(id))
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        record.acknowledged = true;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn eid(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    const ME: &str = "64b7f3a2c9e1d805a4f2b391";
    const PEER: &str = "64b7f3a2c9e1d805a4f2b392";

    fn draft(body: &str) -> MessageDraft {
        MessageDraft {
            receiver_id: eid(PEER),
            body: body.to_string(),
            attachment_refs: vec![],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_persist_assigns_unique_ids() {
        let store = InMemoryStore::new(eid(ME));
        let a = store.persist_message(&draft("one")).await.unwrap();
        let b = store.persist_message(&draft("two")).await.unwrap();
        assert!(a.id.is_some());
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn test_fetch_messages_pages_newest_first() {
        let store = InMemoryStore::new(eid(ME));
        for i in 0..5 {
            store.persist_message(&draft(&format!("m{i}"))).await.unwrap();
        }
        let page = store.fetch_messages(&eid(PEER), 1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.messages.len(), 2);
        let page3 = store.fetch_messages(&eid(PEER), 3, 2).await.unwrap();
        assert_eq!(page3.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryStore::new(eid(ME));
        store.set_fail_writes(true);
        assert!(store.persist_message(&draft("x")).await.is_err());
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_acknowledge_unknown_id() {
        let store = InMemoryStore::new(eid(ME));
        let err = store
            .acknowledge_notification(&eid(PEER))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
