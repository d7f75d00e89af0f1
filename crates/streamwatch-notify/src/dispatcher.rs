//! Fan-out of live announcements to every subscribed webhook.

use std::sync::Arc;

use chrono::Utc;
use streamwatch_helix::{Game, Stream};
use streamwatch_store::{MetadataCache, SubscriptionStore, WebhookRegistration};
use tokio::sync::{Mutex, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{DeliveryStatus, DispatchError, NotificationTransport, build_payload};

/// Default number of webhook deliveries allowed in flight at once.
pub const DEFAULT_MAX_CONCURRENT_DELIVERIES: usize = 16;

/// Announces newly-live channels.
///
/// [`Dispatcher::dispatch`] never blocks the caller: each announcement and
/// each delivery runs as its own task. Deliveries share a fixed number of
/// permits so a large fan-out cannot open unbounded connections. Every
/// delivery is attempted once; a 404 from Discord evicts the owner's webhooks.
#[derive(Clone)]
pub struct Dispatcher {
    cache: Arc<dyn MetadataCache>,
    store: Arc<dyn SubscriptionStore>,
    transport: Arc<dyn NotificationTransport>,
    permits: Arc<Semaphore>,
    tasks: TaskTracker,
    settling: Arc<Mutex<()>>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<dyn MetadataCache>,
        store: Arc<dyn SubscriptionStore>,
        transport: Arc<dyn NotificationTransport>,
        max_concurrent_deliveries: usize,
    ) -> Self {
        Self {
            cache,
            store,
            transport,
            permits: Arc::new(Semaphore::new(max_concurrent_deliveries.max(1))),
            tasks: TaskTracker::new(),
            settling: Arc::new(Mutex::new(())),
        }
    }

    /// Announce `stream` in the background.
    pub fn dispatch(&self, stream: Stream) {
        let this = self.clone();
        self.tasks.spawn(async move {
            if let Err(e) = this.announce(&stream).await {
                error!(
                    user_id = %stream.user_id,
                    stream_id = %stream.id,
                    error = %e,
                    "failed to announce live channel"
                );
            }
        });
    }

    /// Number of announcement and delivery tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Wait until every announcement and delivery started so far has finished.
    ///
    /// Concurrent callers are serialized, so one caller reopening the tracker
    /// cannot strand another in `wait`.
    pub async fn settle(&self) {
        let _guard = self.settling.lock().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    /// Resolve metadata for `stream` and start one delivery per webhook.
    ///
    /// Returns the number of deliveries started.
    #[tracing::instrument(skip(self, stream), fields(user_id = %stream.user_id))]
    pub async fn announce(&self, stream: &Stream) -> Result<usize, DispatchError> {
        let user = self.cache.get_user(&stream.user_id).await?;
        let game: Option<Game> = if stream.game_id.is_empty() {
            None
        } else {
            Some(self.cache.get_game(&stream.game_id).await?)
        };

        let webhooks = self.store.list_webhooks(&user.login).await?;
        if webhooks.is_empty() {
            debug!(channel = %user.login, "no webhooks for live channel");
            return Ok(0);
        }

        info!(
            channel = %user.login,
            webhooks = webhooks.len(),
            "channel went live"
        );

        let count = webhooks.len();
        for registration in webhooks {
            let this = self.clone();
            let channel = user.login.clone();
            let payload = build_payload(stream, &user, game.as_ref(), Utc::now());

            self.tasks.spawn(async move {
                let owner = registration.owner.clone();
                let webhook_id = registration.endpoint.id.clone();
                if let Err(e) = this.deliver(&channel, registration, payload).await {
                    warn!(
                        channel = %channel,
                        owner = %owner,
                        webhook_id = %webhook_id,
                        error = %e,
                        "webhook delivery failed"
                    );
                }
            });
        }

        Ok(count)
    }

    /// Deliver one payload and act on the answer.
    async fn deliver(
        &self,
        channel: &str,
        registration: WebhookRegistration,
        payload: crate::WebhookPayload,
    ) -> Result<DeliveryStatus, DispatchError> {
        let status = {
            // The semaphore is owned here and never closed.
            let _permit = self
                .permits
                .acquire()
                .await
                .expect("delivery semaphore is never closed");
            self.transport
                .send(&registration.endpoint, &payload)
                .await?
        };

        match &status {
            DeliveryStatus::Delivered => {
                debug!(channel, owner = %registration.owner, "webhook delivered");
            }
            DeliveryStatus::Gone => {
                info!(
                    channel,
                    owner = %registration.owner,
                    webhook_id = %registration.endpoint.id,
                    "webhook deleted upstream, removing owner's registrations"
                );
                let untracked = self.store.remove_owner(&registration.owner).await?;
                for name in untracked {
                    info!(channel = %name, "channel untracked after webhook cleanup");
                }
            }
            DeliveryStatus::Rejected { status, body } => {
                warn!(
                    channel,
                    owner = %registration.owner,
                    status,
                    body = %body,
                    "webhook rejected delivery"
                );
            }
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use streamwatch_helix::{HelixError, User};
    use streamwatch_store::{CacheError, Database, SqliteSubscriptionStore, WebhookEndpoint};

    use crate::{NotifyError, WebhookPayload};

    struct StaticCache;

    #[async_trait]
    impl MetadataCache for StaticCache {
        async fn get_user(&self, id: &str) -> Result<User, CacheError> {
            match id {
                "u-foo" => Ok(User {
                    id: id.to_string(),
                    login: "foo".to_string(),
                    display_name: "Foo".to_string(),
                    ..Default::default()
                }),
                _ => Err(CacheError::Upstream(HelixError::NotFound {
                    kind: "user",
                    id: id.to_string(),
                })),
            }
        }

        async fn get_game(&self, id: &str) -> Result<Game, CacheError> {
            Ok(Game {
                id: id.to_string(),
                name: "Science & Technology".to_string(),
                box_art_url: String::new(),
            })
        }
    }

    /// Records every send and answers with a scripted status per webhook ID.
    #[derive(Default)]
    struct ScriptedTransport {
        answers: HashMap<String, DeliveryStatus>,
        sent: Mutex<Vec<String>>,
        active: AtomicUsize,
        peak: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl NotificationTransport for ScriptedTransport {
        async fn send(
            &self,
            endpoint: &WebhookEndpoint,
            _payload: &WebhookPayload,
        ) -> Result<DeliveryStatus, NotifyError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);

            self.sent.lock().unwrap().push(endpoint.id.clone());
            Ok(self
                .answers
                .get(&endpoint.id)
                .cloned()
                .unwrap_or(DeliveryStatus::Delivered))
        }
    }

    fn live_foo() -> Stream {
        Stream {
            id: "s1".to_string(),
            user_id: "u-foo".to_string(),
            user_login: "foo".to_string(),
            game_id: "509670".to_string(),
            ..Default::default()
        }
    }

    async fn store_with_two_webhooks() -> Arc<SqliteSubscriptionStore> {
        let store = Arc::new(SqliteSubscriptionStore::new(Arc::new(
            Database::open_in_memory().unwrap(),
        )));
        store
            .add_webhook("foo", "g1", &WebhookEndpoint::new("w1", "t1"))
            .await
            .unwrap();
        store
            .add_webhook("foo", "g2", &WebhookEndpoint::new("w2", "t2"))
            .await
            .unwrap();
        store
    }

    fn dispatcher(
        store: Arc<SqliteSubscriptionStore>,
        transport: Arc<ScriptedTransport>,
        permits: usize,
    ) -> Dispatcher {
        Dispatcher::new(Arc::new(StaticCache), store, transport, permits)
    }

    #[tokio::test]
    async fn test_delivers_to_every_webhook() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = dispatcher(store, Arc::clone(&transport), 4);

        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;

        let mut sent = transport.sent.lock().unwrap().clone();
        sent.sort();
        assert_eq!(sent, vec!["w1", "w2"]);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_gone_webhook_is_evicted() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport {
            answers: HashMap::from([("w2".to_string(), DeliveryStatus::Gone)]),
            ..Default::default()
        });
        let dispatcher = dispatcher(Arc::clone(&store), transport, 4);

        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;

        let hooks = store.list_webhooks("foo").await.unwrap();
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].endpoint.id, "w1");
        assert_eq!(store.list_tracked_channels().await.unwrap(), vec!["foo"]);
    }

    #[tokio::test]
    async fn test_gone_last_webhook_untracks_channel() {
        let store = Arc::new(SqliteSubscriptionStore::new(Arc::new(
            Database::open_in_memory().unwrap(),
        )));
        store
            .add_webhook("foo", "g1", &WebhookEndpoint::new("w1", "t1"))
            .await
            .unwrap();
        let transport = Arc::new(ScriptedTransport {
            answers: HashMap::from([("w1".to_string(), DeliveryStatus::Gone)]),
            ..Default::default()
        });
        let dispatcher = dispatcher(Arc::clone(&store), transport, 4);

        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;

        assert!(store.list_tracked_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_delivery_keeps_registration() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport {
            answers: HashMap::from([(
                "w1".to_string(),
                DeliveryStatus::Rejected {
                    status: 500,
                    body: String::new(),
                },
            )]),
            ..Default::default()
        });
        let dispatcher = dispatcher(Arc::clone(&store), Arc::clone(&transport), 4);

        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;

        assert_eq!(store.list_webhooks("foo").await.unwrap().len(), 2);
        // Sent exactly once each: no retry.
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_user_sends_nothing() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = dispatcher(store, Arc::clone(&transport), 4);

        let mut stream = live_foo();
        stream.user_id = "u-unknown".to_string();
        let result = dispatcher.announce(&stream).await;
        dispatcher.settle().await;

        assert!(matches!(result, Err(DispatchError::Metadata(_))));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let store = Arc::new(SqliteSubscriptionStore::new(Arc::new(
            Database::open_in_memory().unwrap(),
        )));
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = dispatcher(store, Arc::clone(&transport), 4);

        assert_eq!(dispatcher.announce(&live_foo()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stream_without_category() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport::default());
        let dispatcher = dispatcher(store, Arc::clone(&transport), 4);

        let mut stream = live_foo();
        stream.game_id.clear();
        assert_eq!(dispatcher.announce(&stream).await.unwrap(), 2);
        dispatcher.settle().await;
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(SqliteSubscriptionStore::new(Arc::new(
            Database::open_in_memory().unwrap(),
        )));
        for i in 0..12 {
            store
                .add_webhook(
                    "foo",
                    &format!("g{}", i),
                    &WebhookEndpoint::new(format!("w{}", i), "t"),
                )
                .await
                .unwrap();
        }
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(20)),
            ..Default::default()
        });
        let dispatcher = dispatcher(store, Arc::clone(&transport), 3);

        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;

        assert_eq!(transport.sent.lock().unwrap().len(), 12);
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block_caller() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let dispatcher = dispatcher(store, Arc::clone(&transport), 4);

        dispatcher.dispatch(live_foo());

        // Returned before anything was sent; the announcement is still queued.
        assert!(dispatcher.in_flight() > 0);
        assert!(transport.sent.lock().unwrap().is_empty());

        dispatcher.settle().await;
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_settle_calls_both_return() {
        let store = store_with_two_webhooks().await;
        let transport = Arc::new(ScriptedTransport {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let dispatcher = dispatcher(store, Arc::clone(&transport), 1);

        dispatcher.dispatch(live_foo());

        let first = dispatcher.clone();
        let second = dispatcher.clone();
        let both = async {
            tokio::join!(first.settle(), second.settle());
        };
        tokio::time::timeout(Duration::from_secs(60), both)
            .await
            .expect("settle callers stranded");

        assert_eq!(transport.sent.lock().unwrap().len(), 2);

        // The tracker is open again for later dispatches.
        dispatcher.dispatch(live_foo());
        dispatcher.settle().await;
        assert_eq!(transport.sent.lock().unwrap().len(), 4);
    }
}
