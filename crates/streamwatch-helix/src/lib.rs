//! Twitch Helix client for streamwatch.
//!
//! This crate provides the data source the reconciliation loop polls:
//!
//! - **Streams**: batched live-status lookups by login (at most 100 per request)
//! - **Users / Games**: single-record lookups by ID, used to enrich announcements
//!
//! The [`DataSource`] trait is the seam the rest of the workspace depends on, so
//! tests can swap the HTTP client for an in-process fake.

mod client;
mod error;
mod types;

pub use client::{DEFAULT_HELIX_URL, DataSource, HelixClient, MAX_LOGINS_PER_REQUEST};
pub use error::HelixError;
pub use types::{DataResponse, Game, Stream, User};
