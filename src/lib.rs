pub mod errors;
pub mod json_store;
pub mod loader;
pub mod migrations;
pub mod policy;
pub mod sqlite_store;
pub mod store;
pub mod types;

// Re-export main types and the store backends
pub use errors::{CacheError, Result};
pub use json_store::JsonFeedStore;
pub use loader::{Clock, FeedLoader, LocalFeedLoader};
pub use sqlite_store::SqliteFeedStore;
pub use store::FeedStore;
pub use types::{CachedFeed, FeedImage};

use std::path::PathBuf;
use std::sync::Arc;

/// Open the default SQLite-backed store and wrap it in a loader using the
/// system clock
pub async fn init_feed_cache() -> anyhow::Result<LocalFeedLoader> {
    let store = SqliteFeedStore::open(default_store_path()).await?;
    Ok(LocalFeedLoader::with_system_clock(Arc::new(store)))
}

/// Get the default cache database path
pub fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".feed-cache")
        .join("feed-cache.db")
}

/// Check if the default cache database exists
pub fn store_exists() -> bool {
    default_store_path().exists()
}
