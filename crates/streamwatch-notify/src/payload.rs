//! Discord embed for a live announcement.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::Serialize;
use streamwatch_helix::{Game, Stream, User};

const WEBHOOK_USERNAME: &str = "Twitch";
const WEBHOOK_AVATAR_URL: &str =
    "https://cdn.discordapp.com/attachments/196118375485669376/419336810431250432/glitch_474x356.png";
const AUTHOR_ICON_URL: &str =
    "https://cdn.discordapp.com/attachments/272212345340690443/374388819643858955/twitch11.png";
const TWITCH_PURPLE: u32 = 0x9146FF;

const IMAGE_WIDTH: u32 = 1280;
const IMAGE_HEIGHT: u32 = 720;
const CACHE_BUSTER_LEN: usize = 15;
const UNKNOWN_GAME: &str = "Unknown";

/// Body of `POST /webhooks/{id}/{token}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub avatar_url: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub url: String,
    pub title: String,
    pub description: String,
    pub color: u32,
    pub author: EmbedAuthor,
    pub image: EmbedImage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedThumbnail>,
    /// RFC 3339 start time; Discord renders it in the reader's timezone.
    pub timestamp: String,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedThumbnail {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Build the announcement for `stream`, broadcast by `user`, as seen at `now`.
///
/// `game` is `None` when the broadcaster has not set a category.
pub fn build_payload(
    stream: &Stream,
    user: &User,
    game: Option<&Game>,
    now: DateTime<Utc>,
) -> WebhookPayload {
    let name = if user.display_name.is_empty() {
        &user.login
    } else {
        &user.display_name
    };

    let embed = Embed {
        url: format!("https://twitch.tv/{}", user.login),
        title: format!("{} just went live", name),
        description: stream.title.clone(),
        color: TWITCH_PURPLE,
        author: EmbedAuthor {
            name: "Twitch".to_string(),
            url: "https://twitch.tv".to_string(),
            icon_url: AUTHOR_ICON_URL.to_string(),
        },
        image: EmbedImage {
            url: thumbnail_url(&stream.thumbnail_url, &cache_buster()),
            width: IMAGE_WIDTH,
            height: IMAGE_HEIGHT,
        },
        thumbnail: (!user.profile_image_url.is_empty()).then(|| EmbedThumbnail {
            url: user.profile_image_url.clone(),
        }),
        timestamp: stream.started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        fields: vec![
            EmbedField {
                name: "Viewers".to_string(),
                value: stream.viewer_count.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Game".to_string(),
                value: game
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| UNKNOWN_GAME.to_string()),
                inline: true,
            },
        ],
        footer: EmbedFooter {
            text: format!("Live {}", relative_time(stream.started_at, now)),
        },
    };

    WebhookPayload {
        username: WEBHOOK_USERNAME.to_string(),
        avatar_url: WEBHOOK_AVATAR_URL.to_string(),
        embeds: vec![embed],
    }
}

/// Fill in the Helix thumbnail template and append a cache-busting parameter,
/// otherwise Discord keeps showing the preview from the previous broadcast.
fn thumbnail_url(template: &str, buster: &str) -> String {
    format!(
        "{}?please-do-not-cache-this={}",
        template
            .replace("{width}", &IMAGE_WIDTH.to_string())
            .replace("{height}", &IMAGE_HEIGHT.to_string()),
        buster
    )
}

fn cache_buster() -> String {
    const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    (0..CACHE_BUSTER_LEN)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Render how long ago `then` was, e.g. "5 minutes ago".
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    const MINUTE: i64 = 60;
    const HOUR: i64 = 60 * MINUTE;
    const DAY: i64 = 24 * HOUR;
    const WEEK: i64 = 7 * DAY;
    const MONTH: i64 = 30 * DAY;
    const YEAR: i64 = 365 * DAY;

    let secs = (now - then).num_seconds();
    if secs < 1 {
        return "now".to_string();
    }

    let (count, unit) = match secs {
        s if s < MINUTE => (s, "second"),
        s if s < HOUR => (s / MINUTE, "minute"),
        s if s < DAY => (s / HOUR, "hour"),
        s if s < WEEK => (s / DAY, "day"),
        s if s < MONTH => (s / WEEK, "week"),
        s if s < YEAR => (s / MONTH, "month"),
        s => (s / YEAR, "year"),
    };

    if count == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", count, unit)
    }
}
