//! Error types for notification delivery.

use streamwatch_store::{CacheError, StoreError};
use thiserror::Error;

/// Errors from the webhook transport.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed before Discord answered.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors that abort one channel's announcement or one delivery.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// User or game could not be resolved.
    #[error("metadata error: {0}")]
    Metadata(#[from] CacheError),

    /// Subscription store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Webhook delivery failed.
    #[error("transport error: {0}")]
    Transport(#[from] NotifyError),
}
