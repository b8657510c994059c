//! Domain types cached and mutated by the feature services.

pub mod feed;
pub mod history;
pub mod plan;

pub use feed::FeedPost;
pub use history::{EntryKind, HistoryList, LogEntry};
pub use plan::{PlanDay, PlanDocument, PlanKind};
