use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::Result;
use crate::store::FeedStore;
use crate::types::{CachedFeed, FeedImage};

// On-disk document. Kept separate from the public types so the file layout
// stays stable even if the API types grow fields.
#[derive(Serialize, Deserialize)]
struct CacheDocument {
    feed: Vec<StoredImage>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct StoredImage {
    uuid: Uuid,
    description: Option<String>,
    location: Option<String>,
    url: String,
}

impl CacheDocument {
    fn new(feed: &[FeedImage], timestamp: DateTime<Utc>) -> Self {
        let feed = feed
            .iter()
            .map(|image| StoredImage {
                uuid: image.id,
                description: image.description.clone(),
                location: image.location.clone(),
                url: image.url.clone(),
            })
            .collect();
        CacheDocument { feed, timestamp }
    }

    fn into_cached_feed(self) -> CachedFeed {
        let feed = self
            .feed
            .into_iter()
            .map(|image| FeedImage {
                id: image.uuid,
                description: image.description,
                location: image.location,
                url: image.url,
            })
            .collect();
        CachedFeed {
            feed,
            timestamp: self.timestamp,
        }
    }
}

/// Flat-file store backend. The cache slot is one JSON document at a fixed
/// path; writes go through a sibling temp file and a rename so a failed
/// insert never leaves a half-written document behind.
pub struct JsonFeedStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFeedStore {
    /// Creates a store addressing `path`. No I/O happens until the first
    /// operation; a missing file simply means an empty store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFeedStore {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// The file path this store reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut raw = self.path.clone().into_os_string();
        raw.push(".tmp");
        PathBuf::from(raw)
    }
}

#[async_trait]
impl FeedStore for JsonFeedStore {
    async fn delete(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                log::error!("Failed to delete cache file {:?}: {}", self.path, e);
                Err(e.into())
            }
        }
    }

    async fn insert(&self, feed: &[FeedImage], timestamp: DateTime<Utc>) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(&CacheDocument::new(feed, timestamp))?;

        let _guard = self.lock.lock().await;
        let temp = self.temp_path();
        fs::write(&temp, &encoded)?;

        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            log::error!("Failed to replace cache file {:?}: {}", self.path, e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn retrieve(&self) -> Result<Option<CachedFeed>> {
        let _guard = self.lock.lock().await;

        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: CacheDocument = serde_json::from_slice(&data)?;
        Ok(Some(document.into_cached_feed()))
    }
}
