use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::types::{CachedFeed, FeedImage};

/// Storage contract for the single feed cache slot.
///
/// Every backend must uphold two guarantees on top of the per-operation
/// semantics below:
///
/// - A failed operation leaves the persisted state exactly as it was before
///   the call. No partial writes are ever observable.
/// - Operations against one store instance run serially, and complete in the
///   order they were submitted.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Removes the cache slot. Deleting an already-empty store succeeds.
    async fn delete(&self) -> Result<()>;

    /// Replaces the entire cache slot with the given feed and timestamp.
    async fn insert(&self, feed: &[FeedImage], timestamp: DateTime<Utc>) -> Result<()>;

    /// Returns the current cache slot, or `None` if the store is empty.
    /// Reading has no side effects on the persisted state.
    async fn retrieve(&self) -> Result<Option<CachedFeed>>;
}
