//! Bearer-authenticated reqwest client for the portal REST API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use telecare_shared::events::ChatMessage;
use telecare_shared::{EntityId, IdentityContext};

use crate::error::{ApiError, Result};
use crate::models::{
    MessageDraft, MessagePage, NotificationDraft, NotificationPage, NotificationRecord,
    PartnerPage,
};
use crate::store::PortalStore;

/// REST client for the portal. All calls carry the identity's bearer
/// credential; the server resolves the acting user from it.
#[derive(Debug, Clone)]
pub struct PortalApi {
    http: reqwest::Client,
    base_url: String,
    identity: IdentityContext,
}

impl PortalApi {
    pub fn new(base_url: impl Into<String>, identity: IdentityContext) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            identity,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .header("Authorization", self.identity.authorization())
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();
        debug!(method = %method, path, status = status.as_u16(), "Portal request");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => ApiError::NotFound(path.to_string()),
                _ => ApiError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.request::<(), T>(Method::GET, path, query, None).await
    }
}

#[async_trait]
impl PortalStore for PortalApi {
    async fn fetch_messages(
        &self,
        peer: &EntityId,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage> {
        self.get(
            &format!("/api/chat/messages/{peer}"),
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn persist_message(&self, draft: &MessageDraft) -> Result<ChatMessage> {
        self.request(Method::POST, "/api/chat/messages", &[], Some(draft))
            .await
    }

    async fn list_partners(&self, page: u32, limit: u32) -> Result<PartnerPage> {
        self.get(
            "/api/chat/partners",
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn list_notifications(&self, page: u32, limit: u32) -> Result<NotificationPage> {
        self.get(
            "/api/notifications",
            &[("page", page.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn persist_notification(
        &self,
        draft: &NotificationDraft,
    ) -> Result<NotificationRecord> {
        self.request(Method::POST, "/api/notifications", &[], Some(draft))
            .await
    }

    async fn acknowledge_notification(&self, id: &EntityId) -> Result<NotificationRecord> {
        self.request::<(), NotificationRecord>(
            Method::PATCH,
            &format!("/api/notifications/{id}/acknowledge"),
            &[],
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telecare_shared::Role;

    #[test]
    fn test_base_url_normalisation() {
        let identity = IdentityContext::new(
            EntityId::parse("64b7f3a2c9e1d805a4f2b391").unwrap(),
            Role::Patient,
            "Ana",
            "tok",
        );
        let api = PortalApi::new("https://portal.example/", identity);
        assert_eq!(
            api.url("/api/chat/partners"),
            "https://portal.example/api/chat/partners"
        );
    }
}
