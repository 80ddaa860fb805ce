use crate::errors::Result;
use rusqlite::Connection;

/// Initialize the cache schema
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    // Enable WAL mode and foreign keys
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    log::info!("Creating cache schema...");

    conn.execute_batch(FULL_SCHEMA)?;

    log::info!("Cache schema created successfully");
    Ok(())
}

// Complete cache schema - one cache slot row owning an ordered set of images
const FULL_SCHEMA: &str = r#"
-- Feed Cache Schema v1
PRAGMA foreign_keys = ON;

-- The cache slot. Logically at most one row; retrieval takes the
-- most-recently-inserted row if legacy duplicates exist.
CREATE TABLE IF NOT EXISTS feed_cache (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp    INTEGER NOT NULL    -- epoch nanoseconds
);

-- Feed entries owned by a cache slot, ordered by position
CREATE TABLE IF NOT EXISTS feed_images (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    cache_id     INTEGER NOT NULL REFERENCES feed_cache(id) ON DELETE CASCADE,
    position     INTEGER NOT NULL,   -- insertion order within the slot
    image_id     TEXT NOT NULL,      -- UUID, hyphenated
    description  TEXT,
    location     TEXT,
    url          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_feed_images_slot
ON feed_images(cache_id, position);

-- Meta table for key-value storage
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    val TEXT
);

INSERT OR IGNORE INTO meta (key, val) VALUES ('schema_version', '1');
"#;
