//! Daemon command: the polling loop and its collaborators.
//!
//! Wiring:
//! - One SQLite database shared by the subscription store and metadata cache
//! - A Helix client used both for live status and for metadata misses
//! - A dispatcher delivering through the Discord transport
//! - The reconciler, ticking until Ctrl-C

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use streamwatch_helix::HelixClient;
use streamwatch_notify::{Dispatcher, DiscordTransport};
use streamwatch_scheduler::Reconciler;
use streamwatch_store::{Database, ReadThroughCache, SqliteSubscriptionStore};
use tokio::sync::watch;
use tracing::info;

/// Configuration for the daemon.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub client_id: String,
    /// App access token; requests go out with only `Client-ID` when absent.
    pub access_token: Option<String>,
    /// Seconds between ticks.
    pub update_interval: u64,
    pub helix_url: String,
    pub discord_url: String,
    pub max_concurrent_deliveries: usize,
    /// Seconds before a webhook delivery is abandoned.
    pub delivery_timeout: u64,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(miette::miette!("client ID must not be empty"));
        }
        if self.update_interval == 0 {
            return Err(miette::miette!("update interval must be at least 1 second"));
        }
        if self.max_concurrent_deliveries == 0 {
            return Err(miette::miette!(
                "max concurrent deliveries must be at least 1"
            ));
        }
        if self.delivery_timeout == 0 {
            return Err(miette::miette!("delivery timeout must be at least 1 second"));
        }
        Ok(())
    }
}

/// Build every component described by `config`.
fn build(config: &DaemonConfig) -> Result<Reconciler> {
    let db = Arc::new(
        Database::open(&config.db_path)
            .map_err(|e| miette::miette!("failed to open database: {}", e))?,
    );
    let store = Arc::new(SqliteSubscriptionStore::new(Arc::clone(&db)));

    let mut helix = HelixClient::new(&config.client_id)
        .map_err(|e| miette::miette!("failed to create Helix client: {}", e))?
        .with_base_url(&config.helix_url);
    if let Some(ref token) = config.access_token {
        helix = helix.with_access_token(token);
    }
    let helix = Arc::new(helix);

    let cache = Arc::new(ReadThroughCache::new(helix.clone(), db));
    let transport = DiscordTransport::new(Duration::from_secs(config.delivery_timeout))
        .map_err(|e| miette::miette!("failed to create Discord transport: {}", e))?
        .with_base_url(&config.discord_url);

    let dispatcher = Dispatcher::new(
        cache,
        store.clone(),
        Arc::new(transport),
        config.max_concurrent_deliveries,
    );

    Ok(Reconciler::new(helix, store, dispatcher))
}

/// Run the daemon with the given configuration.
pub async fn run_with_config(config: DaemonConfig) -> Result<()> {
    config.validate()?;
    let reconciler = build(&config)?;

    info!(
        db = %config.db_path.display(),
        helix_url = %config.helix_url,
        interval_secs = config.update_interval,
        "starting streamwatch daemon"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let reconciler = reconciler
        .run(Duration::from_secs(config.update_interval), shutdown_rx)
        .await;

    let pending = reconciler.dispatcher().in_flight();
    if pending > 0 {
        info!(pending, "waiting for in-flight deliveries");
    }
    reconciler.dispatcher().settle().await;

    info!("streamwatch daemon shut down gracefully");
    Ok(())
}
