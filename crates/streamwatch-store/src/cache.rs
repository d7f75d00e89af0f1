//! Read-through metadata cache for Helix users and games.
//!
//! Records are cached forever: display names and avatars change rarely
//! compared to the poll interval, and a stale avatar in an announcement is
//! harmless. Implement [`MetadataCache`] differently to get refresh semantics.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;
use streamwatch_helix::{DataSource, Game, User};
use tracing::{debug, warn};

use crate::db::OptionalExt;
use crate::{CacheError, Database, StoreError};

/// Lookup of descriptive metadata for announcements.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    /// Get a user by Helix ID.
    async fn get_user(&self, id: &str) -> Result<User, CacheError>;

    /// Get a game by Helix ID.
    async fn get_game(&self, id: &str) -> Result<Game, CacheError>;
}

/// Kind of cached record, used as part of the durable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    User,
    Game,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Game => "game",
        }
    }
}

/// Stale-forever cache: memory, then SQLite, then Helix.
///
/// Failed fetches are not cached, so the next call retries. Concurrent misses
/// for the same key may both reach Helix; the last write wins.
pub struct ReadThroughCache {
    source: Arc<dyn DataSource>,
    db: Arc<Database>,
    users: DashMap<String, User>,
    games: DashMap<String, Game>,
}

impl ReadThroughCache {
    pub fn new(source: Arc<dyn DataSource>, db: Arc<Database>) -> Self {
        Self {
            source,
            db,
            users: DashMap::new(),
            games: DashMap::new(),
        }
    }

    fn load<T: DeserializeOwned>(
        &self,
        kind: RecordKind,
        id: &str,
    ) -> Result<Option<T>, StoreError> {
        let body = self.db.with_conn(|conn| {
            let body = conn
                .query_row(
                    "SELECT body FROM cached_records WHERE kind = ?1 AND id = ?2",
                    params![kind.as_str(), id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(body)
        })?;

        body.map(|body| serde_json::from_str(&body).map_err(StoreError::from))
            .transpose()
    }

    fn save<T: Serialize>(&self, kind: RecordKind, id: &str, record: &T) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO cached_records (kind, id, body, cached_at)
                 VALUES (?1, ?2, ?3, datetime('now'))",
                params![kind.as_str(), id, body],
            )?;
            Ok(())
        })
    }

    /// Persist a freshly fetched record. A failed write only costs a refetch later.
    fn remember<T: Serialize>(&self, kind: RecordKind, id: &str, record: &T) {
        if let Err(e) = self.save(kind, id, record) {
            warn!(kind = kind.as_str(), id, error = %e, "failed to persist cached record");
        }
    }
}

#[async_trait]
impl MetadataCache for ReadThroughCache {
    async fn get_user(&self, id: &str) -> Result<User, CacheError> {
        if let Some(user) = self.users.get(id) {
            return Ok(user.clone());
        }

        let user = match self.load::<User>(RecordKind::User, id)? {
            Some(user) => user,
            None => {
                debug!(id, "user cache miss");
                let user = self.source.fetch_user(id).await?;
                self.remember(RecordKind::User, id, &user);
                user
            }
        };

        self.users.insert(id.to_string(), user.clone());
        Ok(user)
    }

    async fn get_game(&self, id: &str) -> Result<Game, CacheError> {
        if let Some(game) = self.games.get(id) {
            return Ok(game.clone());
        }

        let game = match self.load::<Game>(RecordKind::Game, id)? {
            Some(game) => game,
            None => {
                debug!(id, "game cache miss");
                let game = self.source.fetch_game(id).await?;
                self.remember(RecordKind::Game, id, &game);
                game
            }
        };

        self.games.insert(id.to_string(), game.clone());
        Ok(game)
    }
}
