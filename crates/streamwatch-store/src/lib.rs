//! Durable state for streamwatch.
//!
//! - **Subscriptions**: tracked channels, their reference counts, and the
//!   Discord webhooks registered against them
//! - **Metadata cache**: read-through, stale-forever cache of Helix users and
//!   games
//!
//! Both live in one SQLite database opened through [`Database`].

mod cache;
mod db;
mod error;
mod subscriptions;
mod types;

pub use cache::{MetadataCache, ReadThroughCache, RecordKind};
pub use db::Database;
pub use error::{CacheError, StoreError};
pub use subscriptions::{SqliteSubscriptionStore, SubscriptionStore};
pub use types::{TrackedChannel, WebhookEndpoint, WebhookRegistration, normalize_channel};
