//! The current user's identity as supplied by the session collaborator.

use crate::types::{EntityId, Role};

/// Who this client is acting as.
///
/// Injected into every component at construction; the core never mints
/// or refreshes credentials itself.
#[derive(Debug, Clone)]
pub struct IdentityContext {
    pub user_id: EntityId,
    pub role: Role,
    pub display_name: String,
    bearer_token: String,
}

impl IdentityContext {
    pub fn new(
        user_id: EntityId,
        role: Role,
        display_name: impl Into<String>,
        bearer_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            role,
            display_name: display_name.into(),
            bearer_token: bearer_token.into(),
        }
    }

    /// Value for the `Authorization` header on portal REST calls.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer_token)
    }

    /// The presence room this identity joins on connect.
    pub fn presence_room(&self) -> String {
        self.role.room_topic(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_header() {
        let id = EntityId::parse("64b7f3a2c9e1d805a4f2b391").unwrap();
        let identity = IdentityContext::new(id, Role::Patient, "Ada", "tok-123");
        assert_eq!(identity.authorization(), "Bearer tok-123");
        assert_eq!(
            identity.presence_room(),
            "patient:64b7f3a2c9e1d805a4f2b391"
        );
    }
}
