//! Webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use streamwatch_store::WebhookEndpoint;

use crate::{NotifyError, WebhookPayload};

/// Default Discord API base URL.
pub const DEFAULT_DISCORD_API_URL: &str = "https://discord.com/api";

/// Longest response body kept for logging a rejected delivery.
const MAX_REJECTION_BODY: usize = 256;

/// How a webhook endpoint answered a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Accepted (Discord answers 204 No Content).
    Delivered,
    /// The webhook no longer exists; its registration is stale.
    Gone,
    /// Any other answer. Not retried.
    Rejected { status: u16, body: String },
}

/// Delivers payloads to webhook endpoints.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    /// Send `payload` to `endpoint` once.
    async fn send(
        &self,
        endpoint: &WebhookEndpoint,
        payload: &WebhookPayload,
    ) -> Result<DeliveryStatus, NotifyError>;
}

/// [`NotificationTransport`] that posts to Discord's webhook API.
pub struct DiscordTransport {
    http: Client,
    base_url: String,
}

impl DiscordTransport {
    /// Create a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_DISCORD_API_URL.to_string(),
        })
    }

    /// Point the transport at a different API host (or a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn webhook_url(&self, endpoint: &WebhookEndpoint) -> String {
        format!("{}/webhooks/{}/{}", self.base_url, endpoint.id, endpoint.token)
    }
}

#[async_trait]
impl NotificationTransport for DiscordTransport {
    async fn send(
        &self,
        endpoint: &WebhookEndpoint,
        payload: &WebhookPayload,
    ) -> Result<DeliveryStatus, NotifyError> {
        let response = self
            .http
            .post(self.webhook_url(endpoint))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(DeliveryStatus::Delivered);
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(DeliveryStatus::Gone);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_REJECTION_BODY {
            let mut cut = MAX_REJECTION_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }

        Ok(DeliveryStatus::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::build_payload;
    use streamwatch_helix::{Stream, User};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WebhookPayload {
        let stream = Stream {
            id: "s1".to_string(),
            user_id: "u1".to_string(),
            title: "hello".to_string(),
            ..Default::default()
        };
        let user = User {
            id: "u1".to_string(),
            login: "voxel".to_string(),
            ..Default::default()
        };
        build_payload(&stream, &user, None, chrono::Utc::now())
    }

    fn transport(server: &MockServer) -> DiscordTransport {
        DiscordTransport::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_no_content_is_delivered() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhooks/w1/t1"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(serde_json::json!({ "username": "Twitch" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let status = transport(&server)
            .send(&WebhookEndpoint::new("w1", "t1"), &payload())
            .await
            .unwrap();
        assert_eq!(status, DeliveryStatus::Delivered);
    }

    #[tokio::test]
    async fn test_not_found_is_gone() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/webhooks/w2/t2"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "Unknown Webhook",
                "code": 10015
            })))
            .mount(&server)
            .await;

        let status = transport(&server)
            .send(&WebhookEndpoint::new("w2", "t2"), &payload())
            .await
            .unwrap();
        assert_eq!(status, DeliveryStatus::Gone);
    }

    #[tokio::test]
    async fn test_other_status_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let status = transport(&server)
            .send(&WebhookEndpoint::new("w1", "t1"), &payload())
            .await
            .unwrap();
        assert_eq!(
            status,
            DeliveryStatus::Rejected {
                status: 429,
                body: "slow down".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = DiscordTransport::new(Duration::from_millis(200))
            .unwrap()
            .with_base_url(server.uri());
        let result = transport
            .send(&WebhookEndpoint::new("w1", "t1"), &payload())
            .await;
        assert!(matches!(result, Err(NotifyError::Http(_))));
    }
}
