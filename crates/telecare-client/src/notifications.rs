//! Notification relay.
//!
//! Merges store-persisted notifications with entries synthesized
//! locally from real-time events. Local entries are optimistic
//! (unacknowledged, no id) and are replaced by the store's canonical
//! copy once persistence is confirmed. The in-memory window is capped;
//! durability is entirely the portal store's responsibility.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use telecare_api::models::{NotificationDraft, NotificationKind, NotificationRecord};
use telecare_api::PortalStore;
use telecare_shared::events::{NotificationAckPayload, VitalAlertPayload};
use telecare_shared::{CoreError, EntityId, IdentityContext};

#[derive(Debug, Clone)]
struct RelayEntry {
    /// Relay-internal handle used to find the provisional entry when
    /// the canonical copy comes back; never leaves this module.
    local_ref: Uuid,
    record: NotificationRecord,
}

pub struct NotificationRelay {
    identity: IdentityContext,
    store: Arc<dyn PortalStore>,
    entries: Vec<RelayEntry>,
    cap: usize,
}

impl NotificationRelay {
    pub fn new(identity: IdentityContext, store: Arc<dyn PortalStore>, cap: usize) -> Self {
        Self {
            identity,
            store,
            entries: Vec::new(),
            cap,
        }
    }

    /// Presentation-time view, newest first.
    pub fn notifications(&self) -> Vec<&NotificationRecord> {
        let mut view: Vec<&NotificationRecord> = self.entries.iter().map(|e| &e.record).collect();
        view.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        view
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &EntityId) -> Option<&NotificationRecord> {
        self.entries
            .iter()
            .map(|e| &e.record)
            .find(|r| r.id.as_ref() == Some(id))
    }

    /// Merge a page of store-persisted notifications.
    pub async fn refresh(&mut self, page: u32, limit: u32) -> Result<(), CoreError> {
        let fetched = self.store.list_notifications(page, limit).await?;
        for record in fetched.notifications {
            self.merge_canonical(record);
        }
        self.enforce_cap();
        Ok(())
    }

    /// A medical alert arrived over the channel: insert immediately as
    /// unacknowledged with a derived target URL, then persist and
    /// reconcile with the store's canonical copy.
    pub async fn on_alert_event(&mut self, payload: VitalAlertPayload) -> Result<(), CoreError> {
        let draft = NotificationDraft {
            sender_id: payload.sender.clone(),
            receiver_id: self.identity.user_id.clone(),
            kind: NotificationKind::Alert,
            message: payload.message.clone(),
            target_url: Some(format!("/vitals/{}", payload.vital_id)),
            timestamp: Utc::now(),
        };
        self.insert_then_persist(draft).await
    }

    /// An acknowledgment push arrived, carrying the portal-persisted
    /// acknowledgment record. Applied only when that record is
    /// addressed to the current identity: the referenced notification
    /// flips to acknowledged (monotonic) and the embedded record is
    /// merged as the canonical copy.
    pub fn on_ack_event(&mut self, payload: NotificationAckPayload) {
        if payload.notification.receiver_id != self.identity.user_id {
            debug!(
                receiver = %payload.notification.receiver_id.short(),
                "Acknowledgment event for another identity, ignoring"
            );
            return;
        }

        // false -> true only, never reverted.
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.record.id.as_ref() == Some(&payload.notification_id))
        {
            entry.record.acknowledged = true;
        }

        self.merge_canonical(payload.notification);
    }

    /// Acknowledge through the store first; the local flag flips only
    /// on success so a failure stays visible to the professional.
    pub async fn acknowledge(&mut self, id: &EntityId) -> Result<(), CoreError> {
        let canonical = self.store.acknowledge_notification(id).await?;
        self.merge_canonical(canonical);
        Ok(())
    }

    /// Logout/reset.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    async fn insert_then_persist(&mut self, draft: NotificationDraft) -> Result<(), CoreError> {
        let local_ref = Uuid::new_v4();
        self.entries.push(RelayEntry {
            local_ref,
            record: NotificationRecord {
                id: None,
                sender_id: draft.sender_id.clone(),
                receiver_id: draft.receiver_id.clone(),
                kind: draft.kind,
                message: draft.message.clone(),
                target_url: draft.target_url.clone(),
                timestamp: draft.timestamp,
                acknowledged: false,
            },
        });
        self.enforce_cap();

        let canonical = match self.store.persist_notification(&draft).await {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(error = %e, "Notification persist failed, optimistic entry kept");
                return Err(e.into());
            }
        };
        self.reconcile(local_ref, canonical);
        Ok(())
    }

    /// Replace the provisional entry with the store's canonical copy.
    /// If the canonical id is already present (a refresh raced the
    /// persist), the provisional is dropped instead of duplicated.
    fn reconcile(&mut self, local_ref: Uuid, canonical: NotificationRecord) {
        let already_present = canonical.id.is_some()
            && self
                .entries
                .iter()
                .any(|e| e.local_ref != local_ref && e.record.id == canonical.id);

        if already_present {
            self.entries.retain(|e| e.local_ref != local_ref);
            self.merge_canonical(canonical);
            return;
        }

        match self.entries.iter_mut().find(|e| e.local_ref == local_ref) {
            Some(entry) => {
                // Monotonic acknowledged: a canonical copy can set it,
                // never clear it.
                let acknowledged = entry.record.acknowledged || canonical.acknowledged;
                entry.record = NotificationRecord {
                    acknowledged,
                    ..canonical
                };
            }
            // The window rotated the provisional out already.
            None => self.merge_canonical(canonical),
        }
    }

    /// Merge a store record by id. Idempotent: applying the same record
    /// twice leaves a single entry.
    fn merge_canonical(&mut self, canonical: NotificationRecord) {
        let Some(_) = canonical.id else {
            warn!("Store returned a notification without an id, dropping");
            return;
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.record.id == canonical.id)
        {
            Some(entry) => {
                let acknowledged = entry.record.acknowledged || canonical.acknowledged;
                entry.record = NotificationRecord {
                    acknowledged,
                    ..canonical
                };
            }
            None => {
                self.entries.push(RelayEntry {
                    local_ref: Uuid::new_v4(),
                    record: canonical,
                });
                self.enforce_cap();
            }
        }
    }

    /// Sliding window: keep the newest `cap` entries.
    fn enforce_cap(&mut self) {
        if self.entries.len() <= self.cap {
            return;
        }
        self.entries
            .sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));
        self.entries.truncate(self.cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use telecare_api::InMemoryStore;
    use telecare_shared::Role;

    const ME: &str = "64b7f3a2c9e1d805a4f2b391";
    const SENDER: &str = "64b7f3a2c9e1d805a4f2b392";
    const VITAL: &str = "64b7f3a2c9e1d805a4f2b3c0";

    fn eid(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    fn identity() -> IdentityContext {
        IdentityContext::new(eid(ME), Role::Doctor, "Dr. Osei", "tok")
    }

    fn relay(cap: usize) -> (NotificationRelay, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new(eid(ME)));
        let relay = NotificationRelay::new(identity(), store.clone(), cap);
        (relay, store)
    }

    fn alert(message: &str) -> VitalAlertPayload {
        VitalAlertPayload {
            sender: eid(SENDER),
            vital_id: eid(VITAL),
            message: message.to_string(),
            vital: serde_json::json!({"systolic": 195}),
        }
    }

    #[tokio::test]
    async fn test_alert_is_inserted_and_reconciled() {
        let (mut relay, _store) = relay(10);
        relay.on_alert_event(alert("Critical BP")).await.unwrap();

        let view = relay.notifications();
        assert_eq!(view.len(), 1);
        // Reconciled with the canonical copy: id assigned.
        assert!(view[0].id.is_some());
        assert!(!view[0].acknowledged);
        assert_eq!(view[0].target_url.as_deref(), Some(&format!("/vitals/{VITAL}")[..]));
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_optimistic_entry() {
        let (mut relay, store) = relay(10);
        store.set_fail_writes(true);

        let err = relay.on_alert_event(alert("Critical BP")).await.unwrap_err();
        assert!(matches!(err, CoreError::PersistenceFailure(_)));
        assert_eq!(relay.len(), 1);
        assert!(relay.notifications()[0].id.is_none());
    }

    fn ack_payload(referenced: &str, addressed_to: &str) -> NotificationAckPayload {
        NotificationAckPayload {
            sender: eid(SENDER),
            notification_id: eid(referenced),
            message: "Seen".into(),
            notification: NotificationRecord {
                id: Some(eid("64b7f3a2c9e1d805a4f2b3c2")),
                sender_id: eid(SENDER),
                receiver_id: eid(addressed_to),
                kind: NotificationKind::Acknowledgment,
                message: "Seen".into(),
                target_url: None,
                timestamp: Utc::now(),
                acknowledged: true,
            },
        }
    }

    #[tokio::test]
    async fn test_ack_event_for_other_identity_ignored() {
        let (mut relay, _store) = relay(10);
        relay.on_ack_event(ack_payload(VITAL, SENDER));
        assert!(relay.is_empty());
    }

    #[tokio::test]
    async fn test_ack_event_flips_referenced_and_merges_record() {
        let (mut relay, _store) = relay(10);
        relay.on_alert_event(alert("Critical BP")).await.unwrap();
        let alert_id = relay.notifications()[0].id.clone().unwrap();

        relay.on_ack_event(ack_payload(alert_id.as_str(), ME));

        // The referenced alert is acknowledged and the embedded
        // acknowledgment record now sits alongside it.
        assert!(relay.get(&alert_id).unwrap().acknowledged);
        assert_eq!(relay.len(), 2);
        let ack = relay.get(&eid("64b7f3a2c9e1d805a4f2b3c2")).unwrap();
        assert_eq!(ack.kind, NotificationKind::Acknowledgment);

        // Redelivery changes nothing.
        relay.on_ack_event(ack_payload(alert_id.as_str(), ME));
        assert_eq!(relay.len(), 2);
    }

    #[tokio::test]
    async fn test_acknowledge_is_store_first() {
        let (mut relay, store) = relay(10);
        relay.on_alert_event(alert("Critical BP")).await.unwrap();
        let id = relay.notifications()[0].id.clone().unwrap();

        // Store failure leaves local state unchanged.
        store.set_fail_writes(true);
        assert!(relay.acknowledge(&id).await.is_err());
        assert!(!relay.get(&id).unwrap().acknowledged);

        store.set_fail_writes(false);
        relay.acknowledge(&id).await.unwrap();
        assert!(relay.get(&id).unwrap().acknowledged);
    }

    #[tokio::test]
    async fn test_acknowledged_is_monotonic() {
        let (mut relay, store) = relay(10);
        relay.on_alert_event(alert("Critical BP")).await.unwrap();
        let id = relay.notifications()[0].id.clone().unwrap();
        relay.acknowledge(&id).await.unwrap();

        // A stale refresh carrying acknowledged=false cannot revert it.
        let mut stale = store
            .list_notifications(1, 10)
            .await
            .unwrap()
            .notifications
            .remove(0);
        stale.acknowledged = false;
        relay.merge_canonical(stale);

        assert!(relay.get(&id).unwrap().acknowledged);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (mut relay, _store) = relay(10);
        relay.on_alert_event(alert("one")).await.unwrap();
        relay.refresh(1, 10).await.unwrap();
        relay.refresh(1, 10).await.unwrap();
        assert_eq!(relay.len(), 1);
    }

    #[tokio::test]
    async fn test_window_cap_drops_oldest() {
        let (mut relay, store) = relay(3);
        let base = Utc::now();
        for i in 0..5 {
            store.seed_notification(NotificationRecord {
                id: Some(eid(&format!("{i:024x}"))),
                sender_id: eid(SENDER),
                receiver_id: eid(ME),
                kind: NotificationKind::Alert,
                message: format!("n{i}"),
                target_url: None,
                timestamp: base + Duration::minutes(i),
                acknowledged: false,
            });
        }
        relay.refresh(1, 10).await.unwrap();

        assert_eq!(relay.len(), 3);
        let view = relay.notifications();
        // Newest three survive, newest first.
        assert_eq!(view[0].message, "n4");
        assert_eq!(view[2].message, "n2");
    }

    #[tokio::test]
    async fn test_view_sorted_descending() {
        let (mut relay, _store) = relay(10);
        relay.on_alert_event(alert("first")).await.unwrap();
        relay.on_alert_event(alert("second")).await.unwrap();

        let view = relay.notifications();
        assert!(view[0].timestamp >= view[1].timestamp);
    }
}
