use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheKey, CacheStore, RawSnapshot};
use crate::cache::inflight::KeyedLocks;
use crate::remote::RemoteError;

use super::error::MutationError;
use super::resource::ManagedResource;

/// Lifecycle of one mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    /// Local state and cache hold the optimistic value.
    Applied,
    /// The remote write succeeded.
    Committed,
    /// The remote write failed and the snapshot was restored.
    RolledBack,
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationPhase::Idle => write!(f, "idle"),
            MutationPhase::Applied => write!(f, "applied"),
            MutationPhase::Committed => write!(f, "committed"),
            MutationPhase::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// What the remote write gets to work with.
#[derive(Debug, Clone)]
pub struct Pending<T> {
    pub previous: T,
    pub optimistic: T,
}

/// A committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    /// True when the server's value differed from the optimistic one and
    /// state was updated a second time.
    pub reconciled: bool,
}

/// Where a load got its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// A fresh cache entry; the remote was not contacted.
    Cache,
    /// The remote store.
    Remote,
}

/// Writes managed resources: reactive state and cache move together.
///
/// Clone is cheap; clones share the cache and the per-key queues.
#[derive(Clone)]
pub struct Coordinator {
    cache: CacheStore,
    queues: Arc<KeyedLocks>,
}

impl Coordinator {
    pub fn new(cache: CacheStore) -> Self {
        Self {
            cache,
            queues: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Start managing a resource. Nothing is read or written yet.
    pub fn manage<T: Clone>(&self, key: Option<CacheKey>, initial: T) -> ManagedResource<T> {
        ManagedResource::new(key, initial)
    }

    /// Bring a resource up to date for display.
    ///
    /// A fresh cache entry is used as-is. Otherwise any stale cached value is
    /// shown right away, then replaced by the remote value once it arrives.
    /// If the fetch fails, whatever was shown stays and the error is returned.
    pub async fn load<T, F, Fut>(
        &self,
        resource: &ManagedResource<T>,
        ttl: Duration,
        fetch: F,
    ) -> Result<LoadSource, RemoteError>
    where
        T: Clone + PartialEq + Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        if let Some(key) = resource.key() {
            if let Some(value) = self.cache.get::<T>(key, ttl) {
                resource.state.set_if_changed(value);
                return Ok(LoadSource::Cache);
            }
            if let Some(stale) = self.cache.peek_entry::<T>(key) {
                debug!(resource = %key, stored_at = %stale.stored_at, "Showing stale value while refreshing");
                resource.state.set_if_changed(stale.value);
            }
        }
        self.refresh(resource, fetch).await?;
        Ok(LoadSource::Remote)
    }

    /// Replace a resource with the remote value, ignoring the cache.
    pub async fn refresh<T, F, Fut>(&self, resource: &ManagedResource<T>, fetch: F) -> Result<T, RemoteError>
    where
        T: Clone + PartialEq + Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        match fetch().await {
            Ok(value) => {
                resource.state.set_if_changed(value.clone());
                if let Some(key) = resource.key() {
                    self.cache.set(key, &value);
                }
                Ok(value)
            }
            Err(e) if e.is_transient() => {
                debug!(resource = %resource.label(), error = %e, "Remote unreachable, keeping current value");
                Err(e)
            }
            Err(e) => {
                warn!(resource = %resource.label(), error = %e, "Remote fetch rejected, keeping current value");
                Err(e)
            }
        }
    }

    /// Apply `update` locally, then persist it with `write`.
    ///
    /// State and cache hold the optimistic value before `write` is called. On
    /// success the server's value replaces it if different. On failure state
    /// and cache are restored to exactly what they held before and the error
    /// is returned. Dropping the returned future before the write settles
    /// counts as a failure and rolls back the same way.
    ///
    /// Mutations on the same resource are not serialized; see
    /// [`Coordinator::mutate_queued`].
    pub async fn mutate<T, U, W, Fut>(
        &self,
        resource: &ManagedResource<T>,
        update: U,
        write: W,
    ) -> Result<Committed<T>, MutationError>
    where
        T: Clone + PartialEq + Serialize,
        U: FnOnce(&T) -> T,
        W: FnOnce(Pending<T>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let label = resource.label();
        let mut phase = MutationPhase::Idle;
        debug!(resource = %label, %phase, "Mutation starting");

        // Idle -> Applied, with no await in between.
        let cache_snapshot = resource.key().map(|key| self.cache.snapshot_raw(key));
        let (previous, optimistic) = resource.state.apply(update);
        if let Some(key) = resource.key() {
            self.cache.set(key, &optimistic);
        }
        phase = MutationPhase::Applied;
        debug!(resource = %label, %phase, "Optimistic value applied");

        let mut unsettled = Unsettled {
            cache: &self.cache,
            resource,
            previous: Some(previous.clone()),
            snapshot: cache_snapshot,
        };

        let pending = Pending {
            previous,
            optimistic: optimistic.clone(),
        };

        match write(pending).await {
            Ok(canonical) => {
                unsettled.disarm();
                let reconciled = canonical != optimistic;
                if reconciled {
                    resource.state.replace(canonical.clone());
                    if let Some(key) = resource.key() {
                        self.cache.set(key, &canonical);
                    }
                }
                phase = MutationPhase::Committed;
                debug!(resource = %label, %phase, reconciled, "Mutation committed");
                Ok(Committed {
                    value: canonical,
                    reconciled,
                })
            }
            Err(e) => {
                unsettled.roll_back();
                phase = MutationPhase::RolledBack;
                warn!(resource = %label, %phase, error = %e, "Remote write failed, reverted local changes");
                Err(MutationError::RolledBack {
                    resource: label,
                    source: e,
                })
            }
        }
    }

    /// Like [`Coordinator::mutate`], but waits for earlier queued mutations on
    /// the same resource to settle first, so a rollback can never resurrect a
    /// value another queued mutation already changed.
    pub async fn mutate_queued<T, U, W, Fut>(
        &self,
        resource: &ManagedResource<T>,
        update: U,
        write: W,
    ) -> Result<Committed<T>, MutationError>
    where
        T: Clone + PartialEq + Serialize,
        U: FnOnce(&T) -> T,
        W: FnOnce(Pending<T>) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let _turn = self.queues.lock(&resource.label()).await;
        self.mutate(resource, update, write).await
    }

}

/// An applied mutation whose write has not settled yet.
///
/// Dropping it unsettled (the caller gave up on the future mid-write) rolls
/// state and cache back, so a mutation never stays in `Applied`.
struct Unsettled<'a, T: Clone> {
    cache: &'a CacheStore,
    resource: &'a ManagedResource<T>,
    previous: Option<T>,
    snapshot: Option<RawSnapshot>,
}

impl<T: Clone> Unsettled<'_, T> {
    fn disarm(&mut self) {
        self.previous = None;
        self.snapshot = None;
    }

    fn roll_back(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.resource.state.replace(previous);
        }
        if let (Some(key), Some(snapshot)) = (self.resource.key(), self.snapshot.take()) {
            self.cache.restore_raw(key, &snapshot);
        }
    }
}

impl<T: Clone> Drop for Unsettled<'_, T> {
    fn drop(&mut self) {
        if self.previous.is_some() {
            warn!(resource = %self.resource.label(), "Mutation abandoned before the write settled, reverted local changes");
            self.roll_back();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{KeyValueStore, MemoryStore};
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        id: Option<u32>,
        completed: bool,
    }

    fn fixture() -> (Coordinator, Arc<MemoryStore>, Arc<ManualClock>) {
        let backend = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let cache = CacheStore::new(backend.clone(), clock.clone());
        (Coordinator::new(cache), backend, clock)
    }

    fn key() -> CacheKey {
        CacheKey::for_user("wellness", Some("u1"), "task").unwrap()
    }

    fn open() -> Task {
        Task {
            id: Some(1),
            completed: false,
        }
    }

    fn done(task: &Task) -> Task {
        Task {
            completed: true,
            ..task.clone()
        }
    }

    #[tokio::test]
    async fn test_rollback_restores_state_and_cache_exactly() {
        let (coordinator, backend, clock) = fixture();
        coordinator.cache().set(&key(), &open());
        let resource = coordinator.manage(Some(key()), open());
        let raw_before = backend.get(key().as_str()).unwrap();
        clock.advance(Duration::minutes(2));

        let result = coordinator
            .mutate(&resource, done, |_| async {
                Err::<Task, _>(RemoteError::Unavailable("offline".into()))
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err.remote(), RemoteError::Unavailable(_)));
        assert_eq!(resource.current(), open());
        assert_eq!(backend.get(key().as_str()).unwrap(), raw_before);
    }

    #[tokio::test]
    async fn test_rollback_removes_entry_that_did_not_exist() {
        let (coordinator, backend, _) = fixture();
        let resource = coordinator.manage(Some(key()), open());

        let _ = coordinator
            .mutate(&resource, done, |_| async {
                Err::<Task, _>(RemoteError::Unauthorized)
            })
            .await;

        assert_eq!(backend.get(key().as_str()).unwrap(), None);
        assert_eq!(resource.current(), open());
    }

    #[tokio::test]
    async fn test_applied_before_write_starts() {
        let (coordinator, _, _) = fixture();
        let resource = coordinator.manage(Some(key()), open());
        let seen = Mutex::new(None);

        let observer = resource.clone();
        let cache = coordinator.cache().clone();
        coordinator
            .mutate(&resource, done, |pending| {
                *seen.lock().unwrap() = Some((
                    observer.current(),
                    cache.get::<Task>(&key(), Duration::hours(1)),
                ));
                async move { Ok::<_, RemoteError>(pending.optimistic) }
            })
            .await
            .unwrap();

        let (state, cached) = seen.lock().unwrap().take().unwrap();
        assert!(state.completed);
        assert_eq!(cached, Some(state));
    }

    #[tokio::test]
    async fn test_commit_with_equal_value_is_single_transition() {
        let (coordinator, _, _) = fixture();
        let resource = coordinator.manage(Some(key()), open());
        let mut rx = resource.subscribe();
        rx.borrow_and_update();

        let committed = coordinator
            .mutate(&resource, done, |pending| async move { Ok::<_, RemoteError>(pending.optimistic) })
            .await
            .unwrap();

        assert!(!committed.reconciled);
        // The optimistic apply is the only change since we last looked.
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().completed);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_commit_with_canonical_value_updates_again() {
        let (coordinator, _, _) = fixture();
        let resource = coordinator.manage(Some(key()), Task { id: None, completed: false });

        let committed = coordinator
            .mutate(&resource, done, |pending| async move {
                Ok::<_, RemoteError>(Task {
                    id: Some(42),
                    ..pending.optimistic
                })
            })
            .await
            .unwrap();

        assert!(committed.reconciled);
        assert_eq!(resource.current().id, Some(42));
        let cached: Task = coordinator.cache().get(&key(), Duration::hours(1)).unwrap();
        assert_eq!(cached.id, Some(42));
    }

    #[tokio::test]
    async fn test_resource_without_user_skips_cache() {
        let (coordinator, backend, _) = fixture();
        let resource = coordinator.manage(None, open());
        coordinator
            .mutate(&resource, done, |pending| async move { Ok::<_, RemoteError>(pending.optimistic) })
            .await
            .unwrap();
        assert!(resource.current().completed);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_load_prefers_fresh_cache() {
        let (coordinator, _, clock) = fixture();
        coordinator.cache().set(&key(), &done(&open()));
        let resource = coordinator.manage(Some(key()), open());

        let fetches = AtomicUsize::new(0);
        let source = coordinator
            .load(&resource, Duration::minutes(30), || async {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RemoteError>(open())
            })
            .await
            .unwrap();
        assert_eq!(source, LoadSource::Cache);
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
        assert!(resource.current().completed);

        // Expired: stale value shown, then replaced by the remote one.
        clock.advance(Duration::minutes(31));
        let source = coordinator
            .load(&resource, Duration::minutes(30), || async { Ok::<_, RemoteError>(Task { id: Some(7), completed: false }) })
            .await
            .unwrap();
        assert_eq!(source, LoadSource::Remote);
        assert_eq!(resource.current().id, Some(7));
    }

    #[tokio::test]
    async fn test_load_failure_keeps_stale_value() {
        let (coordinator, _, clock) = fixture();
        coordinator.cache().set(&key(), &done(&open()));
        clock.advance(Duration::hours(2));
        let resource = coordinator.manage(Some(key()), open());

        let result = coordinator
            .load(&resource, Duration::minutes(30), || async {
                Err::<Task, _>(RemoteError::Unavailable("offline".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(resource.current().completed);
    }

    #[tokio::test]
    async fn test_rejected_refresh_keeps_current_value() {
        let (coordinator, _, _) = fixture();
        let resource = coordinator.manage(Some(key()), done(&open()));

        let err = coordinator
            .refresh(&resource, || async { Err::<Task, _>(RemoteError::Unauthorized) })
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(resource.current().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_mutation_rolls_back() {
        let (coordinator, backend, _) = fixture();
        coordinator.cache().set(&key(), &open());
        let raw_before = backend.get(key().as_str()).unwrap();
        let resource = coordinator.manage(Some(key()), open());

        let slow_write = coordinator.mutate(&resource, done, |_| async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Err::<Task, _>(RemoteError::Unavailable("offline".into()))
        });
        let result = tokio::time::timeout(std::time::Duration::from_millis(5), slow_write).await;

        assert!(result.is_err());
        assert_eq!(resource.current(), open());
        assert_eq!(backend.get(key().as_str()).unwrap(), raw_before);
    }

    #[tokio::test]
    async fn test_abandoned_mutation_without_prior_entry_leaves_none() {
        let (coordinator, backend, _) = fixture();
        let resource = coordinator.manage(Some(key()), open());

        {
            let mutation = coordinator.mutate(&resource, done, |_| futures::future::pending::<Result<Task, RemoteError>>());
            tokio::pin!(mutation);
            // Poll once so the optimistic value is applied, then give up.
            assert!(futures::poll!(mutation.as_mut()).is_pending());
            assert!(resource.current().completed);
        }

        assert_eq!(resource.current(), open());
        assert_eq!(backend.get(key().as_str()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_queued_mutations_run_in_order() {
        let (coordinator, _, _) = fixture();
        let resource = coordinator.manage(Some(key()), 0u32);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // First mutation fails after the second has been queued.
        let first = coordinator.mutate_queued(
            &resource,
            |v| v + 1,
            |_| async move {
                let _ = release_rx.await;
                Err::<u32, _>(RemoteError::Unavailable("offline".into()))
            },
        );
        let second = async {
            tokio::task::yield_now().await;
            let _ = release_tx.send(());
            coordinator
                .mutate_queued(&resource, |v| v + 10, |p| async move { Ok::<_, RemoteError>(p.optimistic) })
                .await
        };

        let (first, second) = futures::join!(first, second);
        assert!(first.is_err());
        // The second mutation applied on top of the rolled-back value.
        assert_eq!(second.unwrap().value, 10);
        assert_eq!(resource.current(), 10);
    }
}
