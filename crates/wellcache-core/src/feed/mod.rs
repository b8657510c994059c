//! Offset pagination for list views.
//!
//! `FeedPaginator` keeps an ordered list, a fixed page size and a `has_more`
//! flag. Loads are single-flight: a call made while another load is running
//! returns [`PageLoad::Busy`] without touching the list.

pub mod paginator;
pub mod source;

pub use paginator::{FeedPaginator, PageLoad};
pub use source::{PageSource, RemoteFeedSource};
