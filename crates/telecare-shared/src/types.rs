use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Entity reference = 24-character lowercase hex object id.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntityId(String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed entity reference: {0:?}")]
pub struct InvalidIdError(pub String);

impl EntityId {
    /// Validate and normalise a raw id string.
    ///
    /// Accepts exactly 24 hex digits (either case) and stores them
    /// lowercase so ids compare canonically.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdError> {
        let raw = raw.trim();
        if raw.len() != 24 || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidIdError(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log fields.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        EntityId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Portal user role; determines the presence room this client joins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Doctor,
    Patient,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Admin => "admin",
        }
    }

    /// Role-scoped presence room name, e.g. `doctor:<id>`.
    pub fn room_topic(&self, id: &EntityId) -> String {
        format!("{}:{}", self.as_str(), id)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a capture track on a media handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_id() {
        let id = EntityId::parse("64b7f3a2c9e1d805a4f2b391").unwrap();
        assert_eq!(id.as_str(), "64b7f3a2c9e1d805a4f2b391");
        assert_eq!(id.short(), "64b7f3a2");
    }

    #[test]
    fn test_parse_normalises_case() {
        let id = EntityId::parse("64B7F3A2C9E1D805A4F2B391").unwrap();
        assert_eq!(id.as_str(), "64b7f3a2c9e1d805a4f2b391");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(EntityId::parse("not-an-id").is_err());
        assert!(EntityId::parse("").is_err());
        assert!(EntityId::parse("64b7f3a2c9e1d805a4f2b39").is_err()); // 23 chars
        assert!(EntityId::parse("64b7f3a2c9e1d805a4f2b39z").is_err());
    }

    #[test]
    fn test_deserialize_rejects_malformed() {
        let ok: Result<EntityId, _> = serde_json::from_str("\"64b7f3a2c9e1d805a4f2b391\"");
        assert!(ok.is_ok());
        let bad: Result<EntityId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_room_topic() {
        let id = EntityId::parse("64b7f3a2c9e1d805a4f2b391").unwrap();
        assert_eq!(
            Role::Doctor.room_topic(&id),
            "doctor:64b7f3a2c9e1d805a4f2b391"
        );
        assert_eq!(Role::Admin.as_str(), "admin");
    }
}
