//! Live-state reconciliation for streamwatch.
//!
//! This crate provides the polling loop that:
//! - Fetches live status for every tracked channel on a fixed interval
//! - Diffs the result against the channels it already knows are live
//! - Hands each newly-live channel to the notification dispatcher
//!
//! Announcements are edge-triggered: a channel that stays live is announced
//! once per broadcast, not once per tick.

mod error;
mod live_set;
mod reconciler;

pub use error::ReconcileError;
pub use live_set::LiveSet;
pub use reconciler::{Reconciler, TickReport};
