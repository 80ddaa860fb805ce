use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========== Feed Types ==========

/// A single feed entry. Equality is structural across all fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedImage {
    pub id: Uuid,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: String,
}

/// The whole cache slot: an ordered feed plus the instant it was saved.
/// A store holds at most one of these at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFeed {
    pub feed: Vec<FeedImage>,
    pub timestamp: DateTime<Utc>,
}
