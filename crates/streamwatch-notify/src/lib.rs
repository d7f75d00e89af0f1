//! Live announcements over Discord webhooks.
//!
//! - [`payload`]: builds the embed posted for a channel that just went live
//! - [`transport`]: delivers a payload and classifies the response
//! - [`Dispatcher`]: resolves metadata, fans out one delivery per webhook, and
//!   evicts webhooks Discord reports as deleted

mod dispatcher;
mod error;
pub mod payload;
pub mod transport;

pub use dispatcher::{DEFAULT_MAX_CONCURRENT_DELIVERIES, Dispatcher};
pub use error::{DispatchError, NotifyError};
pub use payload::{WebhookPayload, build_payload};
pub use transport::{
    DEFAULT_DISCORD_API_URL, DeliveryStatus, DiscordTransport, NotificationTransport,
};
