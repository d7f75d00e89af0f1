//! Helix HTTP client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{DataResponse, Game, HelixError, Stream, User};

/// Default Helix base URL.
pub const DEFAULT_HELIX_URL: &str = "https://api.twitch.tv/helix";

/// Maximum number of `user_login` parameters Helix accepts per streams request.
pub const MAX_LOGINS_PER_REQUEST: usize = 100;

/// Source of live-status and metadata records.
///
/// Implemented by [`HelixClient`]; tests substitute in-process fakes.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the live streams among `logins`.
    ///
    /// Channels absent from the result are offline. Any failed batch fails the
    /// whole call; partial results are never returned.
    async fn fetch_live_channels(&self, logins: &[String]) -> Result<Vec<Stream>, HelixError>;

    /// Fetch a single user by ID.
    async fn fetch_user(&self, id: &str) -> Result<User, HelixError>;

    /// Fetch a single game or category by ID.
    async fn fetch_game(&self, id: &str) -> Result<Game, HelixError>;
}

/// Client for the Twitch Helix API.
pub struct HelixClient {
    http: Client,
    base_url: String,
    client_id: String,
    access_token: Option<String>,
}

impl HelixClient {
    /// Create a new client identified by `client_id`.
    pub fn new(client_id: impl Into<String>) -> Result<Self, HelixError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_HELIX_URL.to_string(),
            client_id: client_id.into(),
            access_token: None,
        })
    }

    /// Point the client at a different Helix deployment (or a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send an app access token as `Authorization: Bearer` on every request.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a GET against a Helix endpoint and unwrap the `data` envelope.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, HelixError> {
        let url = format!("{}/{}", self.base_url, endpoint);

        let mut request = self
            .http
            .get(&url)
            .header("Client-ID", &self.client_id)
            .query(query);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle HTTP response and parse the JSON envelope.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Vec<T>, HelixError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Helix reports the reset as a unix timestamp rather than Retry-After.
            let retry_after_secs = response
                .headers()
                .get("Ratelimit-Reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i64>().ok())
                .map(|reset| (reset - chrono::Utc::now().timestamp()).max(0) as u64);
            return Err(HelixError::RateLimited { retry_after_secs });
        }

        let text = response.text().await?;

        if !status.is_success() {
            return Err(HelixError::Upstream {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: DataResponse<T> = serde_json::from_str(&text)?;
        Ok(body.data)
    }

    /// Fetch exactly one record by ID, mapping an empty `data` array to `NotFound`.
    async fn get_one<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        kind: &'static str,
        id: &str,
    ) -> Result<T, HelixError> {
        self.get::<T>(endpoint, &[("id", id.to_string())])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HelixError::NotFound {
                kind,
                id: id.to_string(),
            })
    }
}

#[async_trait]
impl DataSource for HelixClient {
    #[tracing::instrument(skip(self, logins), fields(count = logins.len()))]
    async fn fetch_live_channels(&self, logins: &[String]) -> Result<Vec<Stream>, HelixError> {
        let mut live = Vec::new();

        for (batch_index, batch) in logins.chunks(MAX_LOGINS_PER_REQUEST).enumerate() {
            // Helix pages at 20 results unless told otherwise.
            let mut query: Vec<(&str, String)> = batch
                .iter()
                .map(|login| ("user_login", login.clone()))
                .collect();
            query.push(("first", batch.len().to_string()));

            let streams: Vec<Stream> = self.get("streams", &query).await?;
            debug!(
                batch = batch_index,
                requested = batch.len(),
                live = streams.len(),
                "fetched stream batch"
            );
            live.extend(streams);
        }

        Ok(live)
    }

    async fn fetch_user(&self, id: &str) -> Result<User, HelixError> {
        self.get_one("users", "user", id).await
    }

    async fn fetch_game(&self, id: &str) -> Result<Game, HelixError> {
        self.get_one("games", "game", id).await
    }
}
