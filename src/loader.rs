use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::errors::Result;
use crate::policy;
use crate::store::FeedStore;
use crate::types::FeedImage;

/// Injected current-time supplier. Production code uses the system clock;
/// tests pin it.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Consumer-facing load seam. `LocalFeedLoader` is the local conformer;
/// remote loaders plug in behind the same trait at composition time.
#[async_trait]
pub trait FeedLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<FeedImage>>;
}

struct LoaderInner {
    store: Arc<dyn FeedStore>,
    clock: Clock,
}

/// Orchestrates save / load / validate cycles over any `FeedStore`.
///
/// The loader owns no cache state of its own; it only sequences store calls
/// and applies the freshness policy. Dropping the loader (or the future of a
/// call in flight) abandons any pending result without delivering it.
pub struct LocalFeedLoader {
    inner: Arc<LoaderInner>,
}

impl LocalFeedLoader {
    pub fn new(store: Arc<dyn FeedStore>, clock: Clock) -> Self {
        LocalFeedLoader {
            inner: Arc::new(LoaderInner { store, clock }),
        }
    }

    pub fn with_system_clock(store: Arc<dyn FeedStore>) -> Self {
        Self::new(store, Arc::new(Utc::now))
    }

    /// Replaces the cache with `feed`, stamped with the current time.
    ///
    /// Runs delete-then-insert. A delete failure short-circuits: the insert
    /// is never attempted and the delete error is returned. An insert
    /// failure after a successful delete leaves the cache empty; that state
    /// is accepted, not rolled back.
    pub async fn save(&self, feed: &[FeedImage]) -> Result<()> {
        self.inner.store.delete().await?;
        let timestamp = (self.inner.clock)();
        self.inner.store.insert(feed, timestamp).await
    }

    /// Loads the cached feed if one exists and is still fresh.
    ///
    /// An empty or stale cache yields an empty feed. Staleness is observed,
    /// never acted on: load has no delete side effect on the store.
    pub async fn load(&self) -> Result<Vec<FeedImage>> {
        match self.inner.store.retrieve().await? {
            None => Ok(Vec::new()),
            Some(cache) if policy::is_fresh(cache.timestamp, (self.inner.clock)()) => {
                Ok(cache.feed)
            }
            Some(_) => Ok(Vec::new()),
        }
    }

    /// Drops the cache slot if it is stale or unreadable.
    ///
    /// Best-effort maintenance: the follow-up delete's own outcome is
    /// swallowed, and nothing is reported to the caller.
    pub async fn validate_cache(&self) {
        Self::validate(&self.inner.store, &self.inner.clock).await;
    }

    /// Runs `validate_cache` on a background task holding only a weak
    /// reference to the loader internals. A loader dropped before (or while)
    /// the task runs silently abandons the remaining work.
    pub fn spawn_validation(&self) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let unusable = Self::cache_is_unusable(&inner.store, &inner.clock).await;
            drop(inner);

            if !unusable {
                return;
            }
            // Re-check interest before the destructive step.
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Err(e) = inner.store.delete().await {
                log::debug!("Cache self-heal delete failed: {}", e);
            }
        })
    }

    async fn validate(store: &Arc<dyn FeedStore>, clock: &Clock) {
        if Self::cache_is_unusable(store, clock).await {
            if let Err(e) = store.delete().await {
                log::debug!("Cache self-heal delete failed: {}", e);
            }
        }
    }

    async fn cache_is_unusable(store: &Arc<dyn FeedStore>, clock: &Clock) -> bool {
        match store.retrieve().await {
            Err(e) => {
                log::warn!("Dropping unreadable feed cache: {}", e);
                true
            }
            Ok(Some(cache)) if !policy::is_fresh(cache.timestamp, clock()) => {
                log::info!("Dropping stale feed cache from {}", cache.timestamp);
                true
            }
            Ok(_) => false,
        }
    }
}

#[async_trait]
impl FeedLoader for LocalFeedLoader {
    async fn load(&self) -> Result<Vec<FeedImage>> {
        LocalFeedLoader::load(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CacheError;
    use crate::types::CachedFeed;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Message {
        Delete,
        Insert(Vec<FeedImage>, DateTime<Utc>),
        Retrieve,
    }

    #[derive(Default)]
    struct StoreSpy {
        messages: Mutex<Vec<Message>>,
        slot: Mutex<Option<CachedFeed>>,
        fail_delete: bool,
        fail_insert: bool,
        fail_retrieve: bool,
    }

    impl StoreSpy {
        fn messages(&self) -> Vec<Message> {
            self.messages.lock().unwrap().clone()
        }

        fn with_slot(slot: CachedFeed) -> Self {
            StoreSpy {
                slot: Mutex::new(Some(slot)),
                ..Default::default()
            }
        }

        fn failure() -> CacheError {
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"))
        }
    }

    #[async_trait]
    impl FeedStore for StoreSpy {
        async fn delete(&self) -> Result<()> {
            self.messages.lock().unwrap().push(Message::Delete);
            if self.fail_delete {
                return Err(Self::failure());
            }
            *self.slot.lock().unwrap() = None;
            Ok(())
        }

        async fn insert(&self, feed: &[FeedImage], timestamp: DateTime<Utc>) -> Result<()> {
            self.messages
                .lock()
                .unwrap()
                .push(Message::Insert(feed.to_vec(), timestamp));
            if self.fail_insert {
                return Err(Self::failure());
            }
            *self.slot.lock().unwrap() = Some(CachedFeed {
                feed: feed.to_vec(),
                timestamp,
            });
            Ok(())
        }

        async fn retrieve(&self) -> Result<Option<CachedFeed>> {
            self.messages.lock().unwrap().push(Message::Retrieve);
            if self.fail_retrieve {
                return Err(Self::failure());
            }
            Ok(self.slot.lock().unwrap().clone())
        }
    }

    fn unique_image() -> FeedImage {
        FeedImage {
            id: Uuid::new_v4(),
            description: Some("any description".to_string()),
            location: Some("any location".to_string()),
            url: "https://example.com/image.png".to_string(),
        }
    }

    fn unique_feed() -> Vec<FeedImage> {
        vec![unique_image(), unique_image()]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn fixed_clock(at: DateTime<Utc>) -> Clock {
        Arc::new(move || at)
    }

    fn make_loader(spy: StoreSpy, at: DateTime<Utc>) -> (LocalFeedLoader, Arc<StoreSpy>) {
        let spy = Arc::new(spy);
        let loader = LocalFeedLoader::new(spy.clone(), fixed_clock(at));
        (loader, spy)
    }

    // ========== save ==========

    #[tokio::test]
    async fn save_requests_deletion_then_insertion_with_clock_timestamp() {
        let (loader, spy) = make_loader(StoreSpy::default(), now());
        let feed = unique_feed();

        loader.save(&feed).await.unwrap();

        assert_eq!(
            spy.messages(),
            vec![Message::Delete, Message::Insert(feed, now())]
        );
    }

    #[tokio::test]
    async fn save_does_not_insert_when_deletion_fails() {
        let spy = StoreSpy {
            fail_delete: true,
            ..Default::default()
        };
        let (loader, spy) = make_loader(spy, now());

        let result = loader.save(&unique_feed()).await;

        assert!(result.is_err());
        assert_eq!(spy.messages(), vec![Message::Delete]);
    }

    #[tokio::test]
    async fn save_surfaces_insertion_failure() {
        let spy = StoreSpy {
            fail_insert: true,
            ..Default::default()
        };
        let (loader, spy) = make_loader(spy, now());

        let result = loader.save(&unique_feed()).await;

        assert!(result.is_err());
        assert_eq!(spy.messages().len(), 2);
    }

    // ========== load ==========

    #[tokio::test]
    async fn load_delivers_empty_feed_on_empty_store() {
        let (loader, spy) = make_loader(StoreSpy::default(), now());

        let feed = loader.load().await.unwrap();

        assert!(feed.is_empty());
        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn load_surfaces_retrieval_failure() {
        let spy = StoreSpy {
            fail_retrieve: true,
            ..Default::default()
        };
        let (loader, spy) = make_loader(spy, now());

        assert!(loader.load().await.is_err());
        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn load_delivers_cached_feed_when_not_yet_expired() {
        let feed = unique_feed();
        let slot = CachedFeed {
            feed: feed.clone(),
            timestamp: now() - Duration::days(7) + Duration::seconds(1),
        };
        let (loader, spy) = make_loader(StoreSpy::with_slot(slot), now());

        assert_eq!(loader.load().await.unwrap(), feed);
        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn load_delivers_empty_feed_on_expired_cache_without_side_effects() {
        let slot = CachedFeed {
            feed: unique_feed(),
            timestamp: now() - Duration::days(8),
        };
        let (loader, spy) = make_loader(StoreSpy::with_slot(slot), now());

        assert!(loader.load().await.unwrap().is_empty());
        // Stale data is observed, never deleted by load.
        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn load_treats_cache_at_exact_expiry_as_empty() {
        let slot = CachedFeed {
            feed: unique_feed(),
            timestamp: now() - Duration::days(7),
        };
        let (loader, spy) = make_loader(StoreSpy::with_slot(slot), now());

        assert!(loader.load().await.unwrap().is_empty());
        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    // ========== validate_cache ==========

    #[tokio::test]
    async fn validate_does_nothing_on_empty_store() {
        let (loader, spy) = make_loader(StoreSpy::default(), now());

        loader.validate_cache().await;

        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn validate_does_not_delete_fresh_cache() {
        let slot = CachedFeed {
            feed: unique_feed(),
            timestamp: now() - Duration::days(1),
        };
        let (loader, spy) = make_loader(StoreSpy::with_slot(slot), now());

        loader.validate_cache().await;

        assert_eq!(spy.messages(), vec![Message::Retrieve]);
    }

    #[tokio::test]
    async fn validate_deletes_expired_cache_exactly_once() {
        let slot = CachedFeed {
            feed: unique_feed(),
            timestamp: now() - Duration::days(7),
        };
        let (loader, spy) = make_loader(StoreSpy::with_slot(slot), now());

        loader.validate_cache().await;

        assert_eq!(spy.messages(), vec![Message::Retrieve, Message::Delete]);
    }

    #[tokio::test]
    async fn validate_deletes_when_retrieval_fails() {
        let spy = StoreSpy {
            fail_retrieve: true,
            ..Default::default()
        };
        let (loader, spy) = make_loader(spy, now());

        loader.validate_cache().await;

        assert_eq!(spy.messages(), vec![Message::Retrieve, Message::Delete]);
    }

    #[tokio::test]
    async fn validate_swallows_self_heal_delete_failure() {
        let spy = StoreSpy {
            fail_retrieve: true,
            fail_delete: true,
            ..Default::default()
        };
        let (loader, spy) = make_loader(spy, now());

        // Must not panic or report anything.
        loader.validate_cache().await;

        assert_eq!(spy.messages(), vec![Message::Retrieve, Message::Delete]);
    }

    // ========== teardown ==========

    #[tokio::test]
    async fn spawned_validation_is_dropped_when_loader_is_released_first() {
        let spy = Arc::new(StoreSpy {
            fail_retrieve: true,
            ..Default::default()
        });
        let loader = LocalFeedLoader::new(spy.clone(), fixed_clock(now()));

        // Current-thread runtime: the spawned task cannot start before the
        // first await point, so the drop below always wins the race.
        let handle = loader.spawn_validation();
        drop(loader);
        handle.await.unwrap();

        assert_eq!(spy.messages(), vec![]);
    }

    #[tokio::test]
    async fn spawned_validation_self_heals_while_loader_is_alive() {
        let slot = CachedFeed {
            feed: unique_feed(),
            timestamp: now() - Duration::days(30),
        };
        let spy = Arc::new(StoreSpy::with_slot(slot));
        let loader = LocalFeedLoader::new(spy.clone(), fixed_clock(now()));

        loader.spawn_validation().await.unwrap();

        assert_eq!(spy.messages(), vec![Message::Retrieve, Message::Delete]);
    }
}
