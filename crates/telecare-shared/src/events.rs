//! Wire events exchanged over the persistent duplex event channel.
//!
//! Payloads are JSON; each event is an externally tagged envelope
//! `{"event": ..., "data": ...}` matching the portal's channel protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntityId, Role};

/// A chat message as it travels over the channel and the REST store.
///
/// `id` is `None` only for a provisional optimistic entry that the
/// store has not yet acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Option<EntityId>,
    pub sender_id: EntityId,
    pub receiver_id: EntityId,
    pub body: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// The conversation partner from this client's point of view.
    pub fn peer_of(&self, self_id: &EntityId) -> &EntityId {
        if &self.sender_id == self_id {
            &self.receiver_id
        } else {
            &self.sender_id
        }
    }
}

/// One peer in a presence broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub id: EntityId,
    pub display_name: String,
    pub role: Role,
    #[serde(default)]
    pub avatar_ref: Option<String>,
}

/// Wholesale presence snapshot pushed by the portal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub online_users: Vec<PresenceEntry>,
    pub offline_users: Vec<PresenceEntry>,
}

/// A medical alert pushed when a vital reading crosses a threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VitalAlertPayload {
    pub sender: EntityId,
    pub vital_id: EntityId,
    pub message: String,
    /// Raw vital reading; the relay does not interpret it.
    #[serde(default)]
    pub vital: serde_json::Value,
}

/// Category of a medical notification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Acknowledgment,
    #[serde(other)]
    Other,
}

/// A medical notification, either store-persisted (id set) or a local
/// optimistic entry awaiting the store's canonical copy (id `None`).
/// Travels both over the channel (embedded in acknowledgment pushes)
/// and through the REST store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Option<EntityId>,
    pub sender_id: EntityId,
    pub receiver_id: EntityId,
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub target_url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Pushed when a professional acknowledges a notification.
/// `notification` is the acknowledgment record the portal persisted;
/// `notification_id` references the notification being acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAckPayload {
    pub sender: EntityId,
    pub notification_id: EntityId,
    pub message: String,
    pub notification: NotificationRecord,
}

/// Call initiation payload; the single source of truth for the
/// in-flight call session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallInvitePayload {
    pub appointment_id: EntityId,
    pub caller_id: EntityId,
    pub recipient_id: EntityId,
    pub caller_name: String,
}

/// Opaque negotiation data relayed between the two peer endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub appointment_id: EntityId,
    pub caller_id: EntityId,
    pub receiver_id: EntityId,
    pub signal_data: serde_json::Value,
}

/// Identifies the call being declined or hung up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallControlPayload {
    pub appointment_id: EntityId,
    #[serde(default)]
    pub recipient_id: Option<EntityId>,
}

/// Forces the remote side to reset ambiguous call state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClearCallStatePayload {
    pub user_id: EntityId,
}

/// Events the core consumes from the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "userStatus")]
    UserStatus(UserStatusPayload),
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "vital:alert")]
    VitalAlert(VitalAlertPayload),
    #[serde(rename = "vital:new")]
    VitalNew(VitalAlertPayload),
    #[serde(rename = "notification:acknowledged")]
    NotificationAcknowledged(NotificationAckPayload),
    #[serde(rename = "receiveVideoCall")]
    ReceiveVideoCall(CallInvitePayload),
    #[serde(rename = "signal")]
    Signal(SignalPayload),
    #[serde(rename = "callDeclined")]
    CallDeclined(CallControlPayload),
    #[serde(rename = "hangUp")]
    HangUp(CallControlPayload),
}

/// Events the core produces onto the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "join")]
    JoinRoom { room: String },
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "startVideoCall")]
    StartVideoCall(CallInvitePayload),
    #[serde(rename = "signal")]
    Signal(SignalPayload),
    #[serde(rename = "callDeclined")]
    CallDeclined(CallControlPayload),
    #[serde(rename = "hangUp")]
    HangUp(CallControlPayload),
    #[serde(rename = "clearCallState")]
    ClearCallState(ClearCallStatePayload),
}

impl InboundEvent {
    /// Deserialize a channel frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl OutboundEvent {
    /// Serialize for the channel.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eid(s: &str) -> EntityId {
        EntityId::parse(s).unwrap()
    }

    #[test]
    fn test_inbound_event_roundtrip() {
        let event = InboundEvent::Message(ChatMessage {
            id: Some(eid("64b7f3a2c9e1d805a4f2b391")),
            sender_id: eid("64b7f3a2c9e1d805a4f2b392"),
            receiver_id: eid("64b7f3a2c9e1d805a4f2b393"),
            body: "BP reading looks stable".to_string(),
            attachment_refs: vec![],
            timestamp: Utc::now(),
        });

        let bytes = serde_json::to_vec(&event).unwrap();
        let restored = InboundEvent::from_bytes(&bytes).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_tag_names() {
        let event = OutboundEvent::ClearCallState(ClearCallStatePayload {
            user_id: eid("64b7f3a2c9e1d805a4f2b391"),
        });
        let json: serde_json::Value =
            serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(json["event"], "clearCallState");

        let alert = serde_json::json!({
            "event": "vital:alert",
            "data": {
                "sender": "64b7f3a2c9e1d805a4f2b392",
                "vitalId": "64b7f3a2c9e1d805a4f2b394",
                "message": "Critical blood pressure",
                "vital": {"systolic": 195}
            }
        });
        let parsed: InboundEvent = serde_json::from_value(alert).unwrap();
        assert!(matches!(parsed, InboundEvent::VitalAlert(_)));
    }

    #[test]
    fn test_ack_event_frame_parses() {
        let frame = serde_json::json!({
            "event": "notification:acknowledged",
            "data": {
                "sender": "64b7f3a2c9e1d805a4f2b392",
                "notificationId": "64b7f3a2c9e1d805a4f2b3c1",
                "message": "Seen by Dr. Osei",
                "notification": {
                    "id": "64b7f3a2c9e1d805a4f2b3c2",
                    "senderId": "64b7f3a2c9e1d805a4f2b392",
                    "receiverId": "64b7f3a2c9e1d805a4f2b391",
                    "kind": "acknowledgment",
                    "message": "Seen by Dr. Osei",
                    "timestamp": "2026-08-23T10:00:00Z",
                    "acknowledged": true
                }
            }
        });
        let parsed: InboundEvent = serde_json::from_value(frame).unwrap();
        match parsed {
            InboundEvent::NotificationAcknowledged(ack) => {
                assert_eq!(ack.notification_id, eid("64b7f3a2c9e1d805a4f2b3c1"));
                assert_eq!(
                    ack.notification.receiver_id,
                    eid("64b7f3a2c9e1d805a4f2b391")
                );
                assert_eq!(ack.notification.kind, NotificationKind::Acknowledgment);
                assert!(ack.notification.acknowledged);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_peer_of() {
        let me = eid("64b7f3a2c9e1d805a4f2b391");
        let other = eid("64b7f3a2c9e1d805a4f2b392");
        let msg = ChatMessage {
            id: None,
            sender_id: me.clone(),
            receiver_id: other.clone(),
            body: "hi".into(),
            attachment_refs: vec![],
            timestamp: Utc::now(),
        };
        assert_eq!(msg.peer_of(&me), &other);
        assert_eq!(msg.peer_of(&other), &me);
    }
}
