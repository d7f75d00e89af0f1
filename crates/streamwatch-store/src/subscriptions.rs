//! Subscription registry: tracked channels and their webhooks.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Transaction, params};
use tracing::{debug, info};

use crate::db::OptionalExt;
use crate::{
    Database, StoreError, TrackedChannel, WebhookEndpoint, WebhookRegistration, normalize_channel,
};

/// Durable registry of tracked channels and the webhooks subscribed to them.
///
/// A channel is listed as tracked exactly while at least one webhook is
/// registered for it. Every method is atomic with respect to every other.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Ensure a row exists for `channel` without changing its reference count.
    async fn track_channel(&self, channel: &str) -> Result<(), StoreError>;

    /// Register (or replace) the webhook `owner` holds for `channel`.
    ///
    /// The reference count only grows when the `(channel, owner)` pair is new.
    async fn add_webhook(
        &self,
        channel: &str,
        owner: &str,
        endpoint: &WebhookEndpoint,
    ) -> Result<(), StoreError>;

    /// Remove the webhook `owner` holds for `channel`.
    ///
    /// Returns whether a registration was removed; removing a missing one is
    /// not an error. The channel is untracked once no webhooks remain.
    async fn remove_webhook(&self, channel: &str, owner: &str) -> Result<bool, StoreError>;

    /// Remove every webhook held by `owner`, returning the channels that
    /// became untracked as a result.
    async fn remove_owner(&self, owner: &str) -> Result<Vec<String>, StoreError>;

    /// Names of all tracked channels.
    async fn list_tracked_channels(&self) -> Result<Vec<String>, StoreError>;

    /// Tracked channels with their reference counts.
    async fn tracked_channels(&self) -> Result<Vec<TrackedChannel>, StoreError>;

    /// All webhooks registered for `channel`; empty if it is not tracked.
    async fn list_webhooks(&self, channel: &str) -> Result<Vec<WebhookRegistration>, StoreError>;

    /// Channels `owner` has webhooks registered for.
    async fn list_channels_for_owner(&self, owner: &str) -> Result<Vec<String>, StoreError>;
}

/// [`SubscriptionStore`] backed by the SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteSubscriptionStore {
    db: Arc<Database>,
}

impl SqliteSubscriptionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

/// Drop one reference from `channel`, deleting it when none remain.
///
/// Returns true if the channel was untracked.
fn release_channel(tx: &Transaction<'_>, channel: &str) -> Result<bool, StoreError> {
    tx.execute(
        "UPDATE tracked_channels SET ref_count = ref_count - 1 WHERE name = ?1",
        params![channel],
    )?;
    prune_channel(tx, channel)
}

fn prune_channel(tx: &Transaction<'_>, channel: &str) -> Result<bool, StoreError> {
    let deleted = tx.execute(
        "DELETE FROM tracked_channels WHERE name = ?1 AND ref_count <= 0",
        params![channel],
    )?;
    Ok(deleted > 0)
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn track_channel(&self, channel: &str) -> Result<(), StoreError> {
        let channel = normalize_channel(channel);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO tracked_channels (name, ref_count) VALUES (?1, 0)",
                params![channel],
            )?;
            Ok(())
        })
    }

    #[tracing::instrument(skip(self, endpoint), fields(webhook_id = %endpoint.id))]
    async fn add_webhook(
        &self,
        channel: &str,
        owner: &str,
        endpoint: &WebhookEndpoint,
    ) -> Result<(), StoreError> {
        let channel = normalize_channel(channel);
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO tracked_channels (name, ref_count) VALUES (?1, 0)",
                params![channel],
            )?;

            let existed: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM webhooks WHERE channel = ?1 AND owner = ?2)",
                params![channel, owner],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO webhooks (channel, owner, webhook_id, token)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(channel, owner) DO UPDATE
                 SET webhook_id = excluded.webhook_id, token = excluded.token",
                params![channel, owner, endpoint.id, endpoint.token],
            )?;

            if !existed {
                tx.execute(
                    "UPDATE tracked_channels SET ref_count = ref_count + 1 WHERE name = ?1",
                    params![channel],
                )?;
            }

            tx.commit()?;
            debug!(channel = %channel, owner, replaced = existed, "webhook registered");
            Ok(())
        })
    }

    async fn remove_webhook(&self, channel: &str, owner: &str) -> Result<bool, StoreError> {
        let channel = normalize_channel(channel);
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            let removed = tx.execute(
                "DELETE FROM webhooks WHERE channel = ?1 AND owner = ?2",
                params![channel, owner],
            )? > 0;

            let untracked = if removed {
                release_channel(&tx, &channel)?
            } else {
                // Clears a row left at zero by a bare track_channel.
                prune_channel(&tx, &channel)?
            };

            tx.commit()?;
            if untracked {
                info!(channel = %channel, "channel untracked");
            }
            Ok(removed)
        })
    }

    #[tracing::instrument(skip(self))]
    async fn remove_owner(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            let channels: Vec<String> = {
                let mut stmt = tx.prepare("SELECT channel FROM webhooks WHERE owner = ?1")?;
                let rows = stmt
                    .query_map(params![owner], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut untracked = Vec::new();
            for channel in &channels {
                tx.execute(
                    "DELETE FROM webhooks WHERE channel = ?1 AND owner = ?2",
                    params![channel, owner],
                )?;
                if release_channel(&tx, channel)? {
                    untracked.push(channel.clone());
                }
            }

            tx.commit()?;
            info!(
                owner,
                removed = channels.len(),
                untracked = untracked.len(),
                "removed all webhooks for owner"
            );
            Ok(untracked)
        })
    }

    async fn list_tracked_channels(&self) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT name FROM tracked_channels WHERE ref_count > 0 ORDER BY name")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn tracked_channels(&self) -> Result<Vec<TrackedChannel>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, ref_count FROM tracked_channels WHERE ref_count > 0 ORDER BY name",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(name, count)| {
                    let ref_count = u32::try_from(count).map_err(|_| {
                        StoreError::Corrupt(format!("channel {} has ref_count {}", name, count))
                    })?;
                    Ok(TrackedChannel { name, ref_count })
                })
                .collect()
        })
    }

    async fn list_webhooks(&self, channel: &str) -> Result<Vec<WebhookRegistration>, StoreError> {
        let channel = normalize_channel(channel);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT owner, webhook_id, token FROM webhooks WHERE channel = ?1 ORDER BY owner",
            )?;
            let rows = stmt
                .query_map(params![channel], |row| {
                    Ok(WebhookRegistration {
                        owner: row.get(0)?,
                        endpoint: WebhookEndpoint {
                            id: row.get(1)?,
                            token: row.get(2)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    async fn list_channels_for_owner(&self, owner: &str) -> Result<Vec<String>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT channel FROM webhooks WHERE owner = ?1 ORDER BY channel")?;
            let rows = stmt
                .query_map(params![owner], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

impl SqliteSubscriptionStore {
    /// Reference count of a single channel, if it has a row.
    pub fn ref_count(&self, channel: &str) -> Result<Option<u32>, StoreError> {
        let channel = normalize_channel(channel);
        self.db.with_conn(|conn| {
            let count = conn
                .query_row(
                    "SELECT ref_count FROM tracked_channels WHERE name = ?1",
                    params![channel],
                    |row| row.get::<_, u32>(0),
                )
                .optional()?;
            Ok(count)
        })
    }
}
