//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client starts with zero
//! configuration against a local portal.

use std::time::Duration;

use telecare_media::CallConfig;

/// Runtime settings for the real-time client core.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the portal REST API.
    /// Env: `TELECARE_PORTAL_URL`
    /// Default: `http://localhost:5000`
    pub portal_base_url: String,

    /// Page size for history and listing fetches.
    /// Env: `TELECARE_PAGE_SIZE`
    /// Default: `20`
    pub page_size: u32,

    /// In-memory notification window; older entries beyond this bound
    /// are dropped (durability lives in the portal store).
    /// Env: `TELECARE_NOTIFICATION_CAP`
    /// Default: `200`
    pub notification_cap: usize,

    /// Call phase deadlines.
    /// Env: `TELECARE_RING_TIMEOUT_SECS` (ring timeout only)
    pub call: CallConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            portal_base_url: "http://localhost:5000".to_string(),
            page_size: 20,
            notification_cap: 200,
            call: CallConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on anything missing or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TELECARE_PORTAL_URL") {
            if !url.is_empty() {
                config.portal_base_url = url;
            }
        }

        if let Ok(val) = std::env::var("TELECARE_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid TELECARE_PAGE_SIZE, using default"),
            }
        }

        if let Ok(val) = std::env::var("TELECARE_NOTIFICATION_CAP") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.notification_cap = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid TELECARE_NOTIFICATION_CAP, using default")
                }
            }
        }

        if let Ok(val) = std::env::var("TELECARE_RING_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.call.ring_timeout = Duration::from_secs(n),
                _ => {
                    tracing::warn!(value = %val, "Invalid TELECARE_RING_TIMEOUT_SECS, using default")
                }
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.portal_base_url, "http://localhost:5000");
        assert_eq!(config.page_size, 20);
        assert_eq!(config.notification_cap, 200);
        assert_eq!(config.call.ring_timeout, Duration::from_secs(60));
    }
}
