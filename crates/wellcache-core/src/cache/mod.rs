//! TTL cache for domain data fetched from the remote store.
//!
//! This module provides the `CacheStore`, an explicitly constructed cache on
//! top of an injected [`KeyValueStore`](crate::store::KeyValueStore). Entries
//! are JSON envelopes stamped at write time; every read supplies its own TTL.
//!
//! TTLs used by the feature modules:
//! - social feed: 15 minutes
//! - history logs: 30 minutes
//! - generated plans: 60 minutes

pub mod entry;
pub(crate) mod inflight;
pub mod key;
pub mod store;

pub use entry::{age_display, CacheEntry};
pub use key::CacheKey;
pub use store::{CacheStore, EntryInfo};
pub(crate) use store::RawSnapshot;
