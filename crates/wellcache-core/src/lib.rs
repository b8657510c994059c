//! wellcache-core - client-side caching and optimistic state for a wellness
//! app backed by a remote data store.
//!
//! - [`cache`]: TTL cache over a pluggable key-value store
//! - [`mutation`]: optimistic updates with rollback
//! - [`feed`]: offset pagination with a cached first page
//! - [`features`]: plans, history and the social feed wired together

pub mod auth;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod features;
pub mod feed;
pub mod mapping;
pub mod models;
pub mod mutation;
pub mod remote;
pub mod state;
pub mod store;

pub use auth::{Session, SessionData};
pub use cache::{age_display, CacheEntry, CacheKey, CacheStore, EntryInfo};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, TtlPolicy};
pub use features::{FeatureContext, FeatureError, HistoryFeature, PlanFeature};
pub use feed::{FeedPaginator, PageLoad, PageSource};
pub use mapping::{MappingError, RowMapping};
pub use mutation::{Committed, Coordinator, ManagedResource, MutationError, Pending};
pub use remote::{HttpRemote, MemoryRemote, Query, RemoteDataService, RemoteError, Row};
pub use state::StateCell;
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
