use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;

use crate::cache::CacheKey;
use crate::state::StateCell;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Reactive state for one remote entity, optionally mirrored in the cache.
///
/// Only the [`Coordinator`](super::Coordinator) can write it; views read the
/// current value or subscribe to changes.
#[derive(Debug)]
pub struct ManagedResource<T> {
    pub(crate) state: StateCell<T>,
    key: Option<CacheKey>,
    id: u64,
}

impl<T> Clone for ManagedResource<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            key: self.key.clone(),
            id: self.id,
        }
    }
}

impl<T: Clone> ManagedResource<T> {
    pub(crate) fn new(key: Option<CacheKey>, initial: T) -> Self {
        Self {
            state: StateCell::new(initial),
            key,
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn current(&self) -> T {
        self.state.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.state.subscribe()
    }

    /// `None` when no user is signed in: the resource then lives in memory only.
    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    /// Name used in logs and errors.
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.to_string(),
            None => format!("local-{}", self.id),
        }
    }
}
