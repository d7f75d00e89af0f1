//! Helix response records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope shared by every Helix endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// A live stream, as returned by `GET /streams`.
///
/// Helix only returns channels that are currently live, so absence from a
/// response means the channel is offline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Stream ID. Changes with every broadcast.
    pub id: String,
    /// Broadcaster's user ID. Stable across broadcasts.
    pub user_id: String,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_name: String,
    /// Empty when the broadcaster has not picked a category.
    #[serde(default)]
    pub game_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub viewer_count: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub language: String,
    /// Template URL containing `{width}` and `{height}` placeholders.
    #[serde(default)]
    pub thumbnail_url: String,
}

/// A Twitch user, as returned by `GET /users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub login: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub broadcaster_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub offline_image_url: String,
}

/// A game or category, as returned by `GET /games`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}
