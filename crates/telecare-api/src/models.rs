//! DTOs for the portal REST contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use telecare_shared::events::ChatMessage;
use telecare_shared::{EntityId, Role};

pub use telecare_shared::events::{NotificationKind, NotificationRecord};

/// Outgoing message before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub receiver_id: EntityId,
    pub body: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One page of chat history between two identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// A unique conversation partner as listed by the portal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPartner {
    pub id: EntityId,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub avatar_ref: Option<String>,
    #[serde(default)]
    pub last_message_body: Option<String>,
    #[serde(default)]
    pub last_message_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPage {
    pub partners: Vec<ConversationPartner>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Notification as submitted for persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationDraft {
    pub sender_id: EntityId,
    pub receiver_id: EntityId,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub target_url: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<NotificationRecord>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_kind_tolerates_unknown() {
        let kind: NotificationKind = serde_json::from_str("\"alert\"").unwrap();
        assert_eq!(kind, NotificationKind::Alert);
        let kind: NotificationKind = serde_json::from_str("\"reminder\"").unwrap();
        assert_eq!(kind, NotificationKind::Other);
    }

    #[test]
    fn test_partner_optional_fields_default() {
        let json = serde_json::json!({
            "id": "64b7f3a2c9e1d805a4f2b391",
            "displayName": "Ana",
            "role": "patient"
        });
        let partner: ConversationPartner = serde_json::from_value(json).unwrap();
        assert!(partner.last_message_timestamp.is_none());
        assert!(partner.avatar_ref.is_none());
    }
}
