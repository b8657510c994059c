use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::KeyValueStore;

use super::entry::CacheEntry;
use super::inflight::KeyedLocks;
use super::key::CacheKey;

/// TTL cache over a persistent key-value store.
///
/// Reads fail closed: a missing, expired, or undecodable entry is reported as
/// `None` and never as an error. Writes are last-writer-wins. Clone is cheap;
/// clones share the backend and the in-flight table.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    inflight: Arc<KeyedLocks>,
}

/// Exact stored bytes of one entry, captured before an optimistic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RawSnapshot {
    Absent,
    Present(String),
    /// The backend could not be read; rollback drops the entry instead.
    Unreadable,
}

/// Summary of one stored entry, for inspection tools.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub key: String,
    /// `None` when the payload could not be decoded.
    pub stored_at: Option<DateTime<Utc>>,
    pub size_bytes: usize,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    #[serde(rename = "storedAt")]
    stored_at: DateTime<Utc>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            inflight: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn with_system_clock(backend: Arc<dyn KeyValueStore>) -> Self {
        Self::new(backend, Arc::new(SystemClock))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decode the stored entry regardless of age.
    fn load<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        let raw = match self.backend.get(key.as_str()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(cache = %key, error = %e, "Failed to read cache entry");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry<T>>(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(cache = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// The entry with its timestamp, if present and no older than `ttl`.
    pub fn get_entry<T: DeserializeOwned>(&self, key: &CacheKey, ttl: Duration) -> Option<CacheEntry<T>> {
        let entry = self.load::<T>(key)?;
        if entry.is_stale(ttl, self.now()) {
            debug!(cache = %key, stored_at = %entry.stored_at, "Cache entry expired");
            return None;
        }
        Some(entry)
    }

    /// The entry regardless of age. Used to keep showing the last known value
    /// when a refresh fails.
    pub fn peek_entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<CacheEntry<T>> {
        self.load(key)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey, ttl: Duration) -> Option<T> {
        self.get_entry(key, ttl).map(|entry| entry.value)
    }

    /// Store `value` stamped with the current time, replacing any prior entry.
    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let entry = CacheEntry::new(value, self.now());
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(cache = %key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.backend.set(key.as_str(), &raw) {
            warn!(cache = %key, error = %e, "Failed to write cache entry");
        }
    }

    pub fn remove(&self, key: &CacheKey) {
        if let Err(e) = self.backend.remove(key.as_str()) {
            warn!(cache = %key, error = %e, "Failed to remove cache entry");
        }
    }

    /// Return the fresh cached value, or run `populate`, store its result and
    /// return it.
    ///
    /// Concurrent misses on the same key wait for the first populate and then
    /// re-check the cache. A failed populate stores nothing and releases the
    /// key, so the next caller populates again.
    pub async fn get_or_set<T, E, F, Fut>(&self, key: &CacheKey, ttl: Duration, populate: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key, ttl) {
            return Ok(value);
        }

        let _guard = self.inflight.lock(key.as_str()).await;
        if let Some(value) = self.get(key, ttl) {
            debug!(cache = %key, "Cache populated by concurrent caller");
            return Ok(value);
        }

        debug!(cache = %key, "Cache miss, populating");
        let value = populate().await?;
        self.set(key, &value);
        Ok(value)
    }

    pub(crate) fn snapshot_raw(&self, key: &CacheKey) -> RawSnapshot {
        match self.backend.get(key.as_str()) {
            Ok(Some(raw)) => RawSnapshot::Present(raw),
            Ok(None) => RawSnapshot::Absent,
            Err(e) => {
                debug!(cache = %key, error = %e, "Failed to snapshot cache entry");
                RawSnapshot::Unreadable
            }
        }
    }

    pub(crate) fn restore_raw(&self, key: &CacheKey, snapshot: &RawSnapshot) {
        let result = match snapshot {
            RawSnapshot::Present(raw) => self.backend.set(key.as_str(), raw),
            RawSnapshot::Absent | RawSnapshot::Unreadable => self.backend.remove(key.as_str()),
        };
        if let Err(e) = result {
            warn!(cache = %key, error = %e, "Failed to restore cache entry");
        }
    }

    /// Every entry stored for one user.
    pub fn entries_for_user(&self, namespace: &str, user_id: &str) -> Vec<EntryInfo> {
        let Some(prefix) = CacheKey::user_prefix(namespace, user_id) else {
            return Vec::new();
        };
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return Vec::new();
            }
        };

        let mut entries: Vec<EntryInfo> = keys
            .into_iter()
            .filter(|k| k.starts_with(&prefix))
            .filter_map(|key| {
                let raw = self.backend.get(&key).ok().flatten()?;
                let stored_at = serde_json::from_str::<EnvelopeHeader>(&raw)
                    .ok()
                    .map(|h| h.stored_at);
                Some(EntryInfo {
                    key,
                    stored_at,
                    size_bytes: raw.len(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Remove every entry of one user. Returns how many were removed.
    pub fn purge_user(&self, namespace: &str, user_id: &str) -> usize {
        let mut removed = 0;
        for info in self.entries_for_user(namespace, user_id) {
            match self.backend.remove(&info.key) {
                Ok(()) => removed += 1,
                Err(e) => warn!(cache = %info.key, error = %e, "Failed to purge cache entry"),
            }
        }
        debug!(user = user_id, removed, "Purged user cache");
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
