//! Timer-driven reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use streamwatch_helix::DataSource;
use streamwatch_notify::Dispatcher;
use streamwatch_store::SubscriptionStore;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{LiveSet, ReconcileError};

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Channels with at least one webhook.
    pub tracked: usize,
    /// Tracked channels reported live.
    pub live: usize,
    /// Channels handed to the dispatcher this tick.
    pub went_live: usize,
}

/// Polls live status for tracked channels and announces new broadcasts.
///
/// Owns the [`LiveSet`]; nothing else reads or writes it.
pub struct Reconciler {
    source: Arc<dyn DataSource>,
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Dispatcher,
    live: LiveSet,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn DataSource>,
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            source,
            store,
            dispatcher,
            live: LiveSet::new(),
        }
    }

    pub fn live_set(&self) -> &LiveSet {
        &self.live
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run one reconciliation pass.
    ///
    /// On error the live set is left exactly as it was. Announcements are
    /// started before this returns but are not awaited.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&mut self) -> Result<TickReport, ReconcileError> {
        let channels = self.store.list_tracked_channels().await?;
        let streams = self.source.fetch_live_channels(&channels).await?;

        let went_live = self.live.reconcile(&streams);
        let report = TickReport {
            tracked: channels.len(),
            live: streams.len(),
            went_live: went_live.len(),
        };

        debug!(
            tracked = report.tracked,
            live = report.live,
            went_live = report.went_live,
            "tick complete"
        );

        for stream in went_live {
            info!(
                channel = %stream.user_login,
                user_id = %stream.user_id,
                stream_id = %stream.id,
                "channel went live"
            );
            self.dispatcher.dispatch(stream);
        }

        Ok(report)
    }

    /// Tick every `period` until `shutdown_rx` flips to `true`.
    ///
    /// The first tick runs immediately. A tick that overruns its period
    /// swallows the missed ones instead of running them back to back.
    pub async fn run(mut self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) -> Self {
        info!(interval_secs = period.as_secs(), "reconciler starting");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("reconciler received shutdown signal");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "tick failed, live set unchanged");
                    }
                }
            }
        }

        info!("reconciler stopped");
        self
    }
}
