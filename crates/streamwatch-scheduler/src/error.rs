//! Error types for the reconciliation loop.

use thiserror::Error;

/// Errors that end a tick early.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Tracked channels could not be listed.
    #[error("store error: {0}")]
    Store(#[from] streamwatch_store::StoreError),

    /// Live status could not be fetched.
    #[error("Helix error: {0}")]
    Upstream(#[from] streamwatch_helix::HelixError),
}
