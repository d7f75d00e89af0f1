//! Subscription management commands.

use std::path::Path;
use std::sync::Arc;

use miette::Result;
use streamwatch_store::{
    Database, SqliteSubscriptionStore, SubscriptionStore, TrackedChannel, WebhookEndpoint,
    normalize_channel,
};
use tracing::info;

/// Open the subscription store at `path`, creating it if needed.
pub fn open(path: &Path) -> Result<SqliteSubscriptionStore> {
    let db = Database::open(path)
        .map_err(|e| miette::miette!("failed to open database {}: {}", path.display(), e))?;
    Ok(SqliteSubscriptionStore::new(Arc::new(db)))
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(miette::miette!("{} must not be empty", what));
    }
    Ok(())
}

pub async fn subscribe(
    store: &dyn SubscriptionStore,
    channel: &str,
    owner: &str,
    webhook_id: &str,
    token: &str,
) -> Result<()> {
    require(channel, "channel")?;
    require(owner, "owner")?;
    require(webhook_id, "webhook ID")?;
    require(token, "webhook token")?;

    store
        .add_webhook(channel, owner, &WebhookEndpoint::new(webhook_id, token))
        .await
        .map_err(|e| miette::miette!("failed to subscribe: {}", e))?;

    info!(channel = %normalize_channel(channel), owner, "subscribed");
    Ok(())
}

pub async fn unsubscribe(store: &dyn SubscriptionStore, channel: &str, owner: &str) -> Result<()> {
    let removed = store
        .remove_webhook(channel, owner)
        .await
        .map_err(|e| miette::miette!("failed to unsubscribe: {}", e))?;

    if removed {
        info!(channel = %normalize_channel(channel), owner, "unsubscribed");
    } else {
        info!(channel = %normalize_channel(channel), owner, "no subscription to remove");
    }
    Ok(())
}

pub async fn channels(store: &dyn SubscriptionStore, owner: &str) -> Result<Vec<String>> {
    store
        .list_channels_for_owner(owner)
        .await
        .map_err(|e| miette::miette!("failed to list channels: {}", e))
}

pub async fn tracked(store: &dyn SubscriptionStore) -> Result<Vec<TrackedChannel>> {
    store
        .tracked_channels()
        .await
        .map_err(|e| miette::miette!("failed to list tracked channels: {}", e))
}
