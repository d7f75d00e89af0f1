//! Subscription records.

use serde::{Deserialize, Serialize};

/// Credentials of a Discord webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// Webhook ID.
    pub id: String,
    /// Webhook token.
    pub token: String,
}

impl WebhookEndpoint {
    pub fn new(id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: token.into(),
        }
    }
}

/// A webhook registered for one tracked channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookRegistration {
    /// Owning context, typically the Discord channel the webhook posts into.
    pub owner: String,
    pub endpoint: WebhookEndpoint,
}

/// A tracked channel and the number of webhooks subscribed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedChannel {
    pub name: String,
    pub ref_count: u32,
}

/// Normalize a channel login: Twitch logins are case-insensitive and stored lowercase.
pub fn normalize_channel(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_channel() {
        assert_eq!(normalize_channel("  Voxel "), "voxel");
        assert_eq!(normalize_channel("foo"), "foo");
    }
}
