use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{CacheError, Result};
use crate::migrations::apply_migrations;
use crate::store::FeedStore;
use crate::types::{CachedFeed, FeedImage};

/// SQLite store backend. One connection guarded by a fair async mutex, so
/// operations run one at a time in submission order. Replacement of the
/// cache slot happens inside a single transaction.
pub struct SqliteFeedStore {
    connection: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteFeedStore {
    /// Open a store at a specific path, creating the file and schema as
    /// needed. Schema or open failures are construction errors; operations
    /// on an opened store never re-run initialization.
    pub async fn open(path: PathBuf) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        log::info!("Opening feed cache store at: {:?}", path);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        if let Err(e) = apply_migrations(&conn) {
            log::error!("Failed to apply cache schema: {}", e);
            return Err(CacheError::Schema(e.to_string()));
        }

        let store = SqliteFeedStore {
            connection: Arc::new(Mutex::new(conn)),
            path,
        };

        log::info!("Feed cache store initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store instance for testing
    pub async fn open_in_memory() -> Result<Self> {
        log::info!("Creating in-memory feed cache store");

        let conn = Connection::open_in_memory()?;

        if let Err(e) = apply_migrations(&conn) {
            log::error!("Failed to apply cache schema in memory: {}", e);
            return Err(CacheError::Schema(e.to_string()));
        }

        Ok(SqliteFeedStore {
            connection: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the database path
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Health check - ensure the store is accessible
    pub async fn health_check(&self) -> Result<()> {
        let conn = self.connection.lock().await;
        match conn.query_row("SELECT 1", [], |_| Ok(())) {
            Ok(_) => Ok(()),
            Err(e) => {
                log::error!("Health check failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Execute a closure with the database connection
    async fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send,
        R: Send,
    {
        let conn = self.connection.lock().await;
        f(&conn)
    }

    /// Execute a transaction
    async fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send,
        R: Send,
    {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;

        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

fn encode_timestamp(timestamp: DateTime<Utc>) -> Result<i64> {
    timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| CacheError::InvalidData(format!("timestamp out of range: {}", timestamp)))
}

fn decode_image_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|e| CacheError::InvalidData(format!("bad image id {:?}: {}", raw, e)))
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn delete(&self) -> Result<()> {
        self.transaction(|tx| {
            // Cascades to feed_images; no-op when the slot is already empty.
            tx.execute("DELETE FROM feed_cache", [])?;
            Ok(())
        })
        .await
    }

    async fn insert(&self, feed: &[FeedImage], timestamp: DateTime<Utc>) -> Result<()> {
        let raw_timestamp = encode_timestamp(timestamp)?;

        self.transaction(|tx| {
            // Replace semantics: drop any existing slot so repeated saves
            // never accumulate duplicates.
            tx.execute("DELETE FROM feed_cache", [])?;
            tx.execute(
                "INSERT INTO feed_cache (timestamp) VALUES (?1)",
                [raw_timestamp],
            )?;
            let cache_id = tx.last_insert_rowid();

            let mut stmt = tx.prepare(
                "INSERT INTO feed_images (cache_id, position, image_id, description, location, url)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, image) in feed.iter().enumerate() {
                stmt.execute(rusqlite::params![
                    cache_id,
                    position as i64,
                    image.id.to_string(),
                    image.description,
                    image.location,
                    image.url,
                ])?;
            }
            Ok(())
        })
        .await
    }

    async fn retrieve(&self) -> Result<Option<CachedFeed>> {
        self.with_connection(|conn| {
            let slot = conn
                .query_row(
                    "SELECT id, timestamp FROM feed_cache ORDER BY id DESC LIMIT 1",
                    [],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()?;

            let Some((cache_id, raw_timestamp)) = slot else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT image_id, description, location, url FROM feed_images
                 WHERE cache_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt
                .query_map([cache_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let feed = rows
                .into_iter()
                .map(|(raw_id, description, location, url)| {
                    Ok(FeedImage {
                        id: decode_image_id(&raw_id)?,
                        description,
                        location,
                        url,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            Ok(Some(CachedFeed {
                feed,
                timestamp: DateTime::from_timestamp_nanos(raw_timestamp),
            }))
        })
        .await
    }
}
