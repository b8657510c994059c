//! Persistent key-value storage underneath the cache.
//!
//! The cache only needs a string-keyed string store that survives restarts.
//! Two backends are provided:
//! - `FileStore`: one JSON file per key inside a directory
//! - `MemoryStore`: a process-local map, used by tests and previews

pub mod error;
pub mod file;
pub mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// A persistent string store keyed by string.
///
/// Implementations must be safe to share between tasks. Nothing above this
/// trait assumes the data survives a device wipe.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// All keys currently held, in no particular order.
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}
