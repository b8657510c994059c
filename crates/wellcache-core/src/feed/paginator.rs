use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::cache::{CacheKey, CacheStore};
use crate::remote::RemoteError;
use crate::state::StateCell;

use super::source::PageSource;

/// Outcome of a load call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// The remote returned this many items.
    Fetched(usize),
    /// Another load was already running; nothing was fetched.
    Busy,
    /// The last page came back short; `load_more` does not fetch again.
    Exhausted,
}

struct FirstPageCache {
    cache: CacheStore,
    key: CacheKey,
    ttl: Duration,
}

/// Clears the busy flag when a load finishes, however it finishes.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedPaginator<T> {
    source: Arc<dyn PageSource<T>>,
    first_page: Option<FirstPageCache>,
    page_size: usize,
    items: StateCell<Vec<T>>,
    has_more: AtomicBool,
    busy: AtomicBool,
}

impl<T> FeedPaginator<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn PageSource<T>>, page_size: usize) -> Self {
        Self {
            source,
            first_page: None,
            page_size: page_size.max(1),
            items: StateCell::new(Vec::new()),
            has_more: AtomicBool::new(true),
            busy: AtomicBool::new(false),
        }
    }

    /// Keep the first page in the cache so the list can render before the
    /// remote answers. Without a key (no signed-in user) nothing is cached.
    pub fn with_cache(mut self, cache: CacheStore, key: Option<CacheKey>, ttl: Duration) -> Self {
        self.first_page = key.map(|key| FirstPageCache { cache, key, ttl });
        self
    }

    pub fn items(&self) -> Vec<T> {
        self.items.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.items.subscribe()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// A full last page means more may exist. This over-reports by one empty
    /// page when the total is an exact multiple of the page size.
    pub fn has_more(&self) -> bool {
        self.has_more.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    fn update_has_more(&self, fetched: usize) {
        self.has_more.store(fetched >= self.page_size, Ordering::Release);
    }

    /// Load the first page, replacing whatever the list holds.
    ///
    /// A cached first page, if still fresh, is shown before the remote call.
    /// The remote page then replaces the list outright. If the remote call
    /// fails, the cached page stays visible and the error is returned.
    pub async fn load_initial(&self) -> Result<PageLoad, RemoteError> {
        let Some(_guard) = self.try_begin() else {
            debug!("Feed load already in flight, skipping");
            return Ok(PageLoad::Busy);
        };

        if let Some(first) = &self.first_page {
            if let Some(cached) = first.cache.get::<Vec<T>>(&first.key, first.ttl) {
                debug!(cache = %first.key, count = cached.len(), "Rendering cached first page");
                self.update_has_more(cached.len());
                self.items.replace(cached);
            }
        }

        let page = self.source.fetch_page(0, self.page_size).await?;
        let fetched = page.len();
        if let Some(first) = &self.first_page {
            first.cache.set(&first.key, &page);
        }
        self.update_has_more(fetched);
        self.items.replace(page);
        Ok(PageLoad::Fetched(fetched))
    }

    /// Same as [`FeedPaginator::load_initial`]; for pull-to-refresh.
    pub async fn refresh(&self) -> Result<PageLoad, RemoteError> {
        self.load_initial().await
    }

    /// Append the next page, starting at the current list length.
    pub async fn load_more(&self) -> Result<PageLoad, RemoteError> {
        if !self.has_more() {
            return Ok(PageLoad::Exhausted);
        }
        let Some(_guard) = self.try_begin() else {
            debug!("Feed load already in flight, skipping");
            return Ok(PageLoad::Busy);
        };

        let offset = self.items.get().len();
        let page = self.source.fetch_page(offset, self.page_size).await?;
        let fetched = page.len();
        debug!(offset, fetched, "Fetched next feed page");

        self.update_has_more(fetched);
        self.items.apply(|items| {
            let mut next = items.clone();
            next.extend(page);
            next
        });
        Ok(PageLoad::Fetched(fetched))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Serves `0..total` as a list, yielding once per call so concurrent
    /// callers interleave.
    struct NumberSource {
        total: u32,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl NumberSource {
        fn new(total: u32) -> Arc<Self> {
            Arc::new(Self {
                total,
                calls: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl PageSource<u32> for NumberSource {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<u32>, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(RemoteError::Unavailable("feed".into()));
            }
            Ok((0..self.total).skip(offset).take(limit).collect())
        }
    }

    #[tokio::test]
    async fn test_full_then_short_page() {
        let source = NumberSource::new(14);
        let feed = FeedPaginator::<u32>::new(source.clone(), 10);

        assert_eq!(feed.load_initial().await.unwrap(), PageLoad::Fetched(10));
        assert!(feed.has_more());

        assert_eq!(feed.load_more().await.unwrap(), PageLoad::Fetched(4));
        assert_eq!(feed.items().len(), 14);
        assert!(!feed.has_more());

        assert_eq!(feed.load_more().await.unwrap(), PageLoad::Exhausted);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exact_multiple_costs_one_empty_page() {
        let feed = FeedPaginator::<u32>::new(NumberSource::new(20), 10);
        feed.load_initial().await.unwrap();
        assert_eq!(feed.load_more().await.unwrap(), PageLoad::Fetched(10));
        assert!(feed.has_more());
        assert_eq!(feed.load_more().await.unwrap(), PageLoad::Fetched(0));
        assert!(!feed.has_more());
        assert_eq!(feed.items(), (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrent_load_more_is_suppressed() {
        let source = NumberSource::new(100);
        let feed = FeedPaginator::<u32>::new(source.clone(), 10);
        feed.load_initial().await.unwrap();

        let (a, b) = futures::join!(feed.load_more(), feed.load_more());
        assert_eq!(a.unwrap(), PageLoad::Fetched(10));
        assert_eq!(b.unwrap(), PageLoad::Busy);

        let items = feed.items();
        assert_eq!(items, (0..20).collect::<Vec<_>>());
        assert!(!feed.is_loading());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_more_releases_busy_flag() {
        let source = NumberSource::new(30);
        let feed = FeedPaginator::<u32>::new(source.clone(), 10);
        feed.load_initial().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(feed.load_more().await.is_err());
        assert!(!feed.is_loading());
        assert_eq!(feed.items().len(), 10);

        source.fail.store(false, Ordering::SeqCst);
        assert_eq!(feed.load_more().await.unwrap(), PageLoad::Fetched(10));
    }

    fn cached_feed(source: Arc<NumberSource>) -> (FeedPaginator<u32>, CacheStore, CacheKey, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        let cache = CacheStore::new(Arc::new(MemoryStore::new()), clock.clone());
        let key = CacheKey::for_user("wellness", Some("u1"), "feed").unwrap();
        let feed = FeedPaginator::<u32>::new(source, 10).with_cache(cache.clone(), Some(key.clone()), Duration::minutes(15));
        (feed, cache, key, clock)
    }

    #[tokio::test]
    async fn test_cached_first_page_rendered_then_replaced() {
        let (feed, cache, key, _) = cached_feed(NumberSource::new(3));
        cache.set(&key, &vec![7u32, 8, 9, 10]);

        let mut rx = feed.subscribe();
        rx.borrow_and_update();
        let load = feed.load_initial();
        tokio::pin!(load);

        // Poll until the cached page has been published.
        tokio::select! {
            biased;
            _ = rx.changed() => {}
            _ = &mut load => panic!("load finished before rendering the cached page"),
        }
        assert_eq!(*rx.borrow_and_update(), vec![7, 8, 9, 10]);

        load.await.unwrap();
        assert_eq!(feed.items(), vec![0, 1, 2]);
        assert!(!feed.has_more());
        assert_eq!(cache.get::<Vec<u32>>(&key, Duration::minutes(15)), Some(vec![0, 1, 2]));
    }

    #[tokio::test]
    async fn test_remote_failure_keeps_cached_page() {
        let source = NumberSource::new(3);
        source.fail.store(true, Ordering::SeqCst);
        let (feed, cache, key, _) = cached_feed(source);
        cache.set(&key, &vec![5u32]);

        assert!(feed.load_initial().await.is_err());
        assert_eq!(feed.items(), vec![5]);
    }

    #[tokio::test]
    async fn test_expired_first_page_not_rendered() {
        let source = NumberSource::new(3);
        source.fail.store(true, Ordering::SeqCst);
        let (feed, cache, key, clock) = cached_feed(source);
        cache.set(&key, &vec![5u32]);
        clock.advance(Duration::minutes(16));

        assert!(feed.load_initial().await.is_err());
        assert!(feed.items().is_empty());
    }
}
