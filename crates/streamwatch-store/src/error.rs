//! Error types for the store crate.

use streamwatch_helix::HelixError;
use thiserror::Error;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Cached record could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The connection is unusable (a previous holder panicked).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row violates an invariant.
    #[error("store corrupt: {0}")]
    Corrupt(String),
}

/// Errors from the metadata cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The record was not cached and Helix could not provide it.
    #[error("upstream error: {0}")]
    Upstream(#[from] HelixError),

    /// The local store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
