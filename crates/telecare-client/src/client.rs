//! Client core: owns the engines and routes channel events to them.
//!
//! One `PortalClient` per authenticated identity. Inbound channel
//! events flow through `handle_event`; commands from the embedding UI
//! call the public methods. A periodic `tick` drives call deadlines.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use telecare_api::models::NotificationRecord;
use telecare_api::PortalStore;
use telecare_media::{CallError, CallPhase, CallStateMachine, MediaDevices};
use telecare_shared::events::{ChatMessage, InboundEvent};
use telecare_shared::{CoreError, EntityId, IdentityContext};
use telecare_transport::{join_presence_room, PresenceTracker, TransportChannel};

use crate::config::ClientConfig;
use crate::conversations::{Conversation, ConversationList};
use crate::messages::MessageSyncEngine;
use crate::notifications::NotificationRelay;

pub struct PortalClient {
    identity: IdentityContext,
    config: ClientConfig,
    transport: Arc<dyn TransportChannel>,
    presence: PresenceTracker,
    conversations: ConversationList,
    messages: MessageSyncEngine,
    notifications: NotificationRelay,
    call: CallStateMachine,
    store: Arc<dyn PortalStore>,
}

impl PortalClient {
    pub fn new(
        identity: IdentityContext,
        config: ClientConfig,
        transport: Arc<dyn TransportChannel>,
        store: Arc<dyn PortalStore>,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        let messages = MessageSyncEngine::new(identity.clone(), transport.clone(), store.clone());
        let notifications =
            NotificationRelay::new(identity.clone(), store.clone(), config.notification_cap);
        let call = CallStateMachine::new(
            identity.clone(),
            config.call.clone(),
            transport.clone(),
            devices,
        );
        Self {
            conversations: ConversationList::new(identity.user_id.clone()),
            presence: PresenceTracker::new(),
            identity,
            config,
            transport,
            messages,
            notifications,
            call,
            store,
        }
    }

    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn conversations(&self) -> Vec<&Conversation> {
        self.conversations.sorted()
    }

    pub fn messages_with(&self, peer: &EntityId) -> Vec<&ChatMessage> {
        self.messages.conversation_with(peer)
    }

    pub fn notifications(&self) -> Vec<&NotificationRecord> {
        self.notifications.notifications()
    }

    pub fn call(&self) -> &CallStateMachine {
        &self.call
    }

    pub fn call_mut(&mut self) -> &mut CallStateMachine {
        &mut self.call
    }

    /// The transport (re)connected: rejoin the presence room and clear
    /// any call state the remote side may still hold for us.
    pub fn on_connected(&mut self) {
        info!(user = %self.identity.user_id.short(), "Transport connected");
        if let Err(e) = join_presence_room(self.transport.as_ref(), &self.identity) {
            warn!(error = %e, "Presence room join failed");
        }
        self.call.force_remote_reset();
    }

    /// Route one inbound channel event to the engine that owns it.
    pub async fn handle_event(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::UserStatus(status) => {
                self.presence.apply_broadcast(status);
                self.conversations.apply_presence(&self.presence);
            }
            InboundEvent::Message(message) => {
                if self.messages.on_channel_message(message.clone()) {
                    self.conversations.apply_message(&message, &self.presence);
                }
            }
            InboundEvent::VitalAlert(alert) | InboundEvent::VitalNew(alert) => {
                if let Err(e) = self.notifications.on_alert_event(alert).await {
                    warn!(error = %e, "Alert relay failed");
                }
            }
            InboundEvent::NotificationAcknowledged(ack) => self.notifications.on_ack_event(ack),
            InboundEvent::ReceiveVideoCall(invite) => self.call.on_incoming_call(invite),
            InboundEvent::Signal(signal) => self.call.on_signal(&signal),
            InboundEvent::CallDeclined(ctl) => self.call.on_remote_declined(&ctl),
            InboundEvent::HangUp(ctl) => self.call.on_remote_hang_up(&ctl),
        }
    }

    /// Send a chat message; the conversation list is updated from the
    /// finalized copy.
    pub async fn send_message(
        &mut self,
        receiver: &str,
        body: String,
        attachment_refs: Vec<String>,
    ) -> Result<ChatMessage, CoreError> {
        let sent = self.messages.send(receiver, body, attachment_refs).await?;
        self.conversations.apply_message(&sent, &self.presence);
        Ok(sent)
    }

    /// Fetch one history page with `peer`, folding new messages into
    /// the conversation summary.
    pub async fn fetch_history(&mut self, peer: &EntityId, page: u32) -> Result<usize, CoreError> {
        let merged = self
            .messages
            .fetch_history(peer, page, self.config.page_size)
            .await?;
        if let Some(latest) = self.messages.conversation_with(peer).last() {
            let latest = (*latest).clone();
            self.conversations.apply_message(&latest, &self.presence);
        }
        Ok(merged)
    }

    /// Populate the conversation list from the portal's partner
    /// listing.
    pub async fn load_conversations(&mut self, page: u32) -> Result<(), CoreError> {
        let fetched = self.store.list_partners(page, self.config.page_size).await?;
        debug!(partners = fetched.partners.len(), page, "Partner page loaded");
        for partner in fetched.partners {
            self.conversations.upsert_partner(partner, &self.presence);
        }
        Ok(())
    }

    pub async fn refresh_notifications(&mut self, page: u32) -> Result<(), CoreError> {
        self.notifications
            .refresh(page, self.config.page_size)
            .await
    }

    pub async fn acknowledge_notification(&mut self, id: &EntityId) -> Result<(), CoreError> {
        self.notifications.acknowledge(id).await
    }

    pub fn start_call(
        &mut self,
        appointment_id: EntityId,
        recipient_id: EntityId,
    ) -> Result<(), CallError> {
        self.call.start_call(appointment_id, recipient_id, &self.presence)
    }

    pub fn accept_call(&mut self) -> Result<(), CallError> {
        self.call.accept_call()
    }

    pub fn decline_call(&mut self) -> Result<(), CallError> {
        self.call.decline_call()
    }

    pub fn hang_up(&mut self) {
        self.call.hang_up();
    }

    pub fn toggle_audio_mute(&mut self) -> Result<bool, CallError> {
        self.call.toggle_audio_mute()
    }

    pub fn toggle_video_mute(&mut self) -> Result<bool, CallError> {
        self.call.toggle_video_mute()
    }

    /// Drive phase deadlines; called periodically by the event loop.
    pub fn tick(&mut self, now: Instant) {
        self.call.check_timeout(now);
    }

    /// Logout: forget every engine's state and release any call media.
    pub fn reset(&mut self) {
        self.call.reset();
        self.messages.reset();
        self.notifications.clear();
        self.conversations.clear();
        self.presence.clear();
        info!(user = %self.identity.user_id.short(), "Client state reset");
    }
}

/// Run the client's event loop: inbound channel events interleaved
/// with a periodic tick for call deadlines. Returns when the inbound
/// channel closes.
pub fn spawn_event_loop(
    client: Arc<Mutex<PortalClient>>,
    mut inbound: mpsc::Receiver<InboundEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                event = inbound.recv() => {
                    match event {
                        Some(event) => client.lock().await.handle_event(event).await,
                        None => {
                            info!("Inbound channel closed, event loop exiting");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    client.lock().await.tick(Instant::now());
                }
            }
        }
    })
}
