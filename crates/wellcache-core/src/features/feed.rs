use std::sync::Arc;

use crate::feed::{FeedPaginator, PageSource, RemoteFeedSource};
use crate::models::FeedPost;
use crate::remote::Query;

use super::FeatureContext;

/// The social feed, newest first, with its first page cached per user.
pub fn social_feed(ctx: &FeatureContext, page_size: usize) -> FeedPaginator<FeedPost> {
    let source: Arc<dyn PageSource<FeedPost>> =
        Arc::new(RemoteFeedSource::new(ctx.remote.clone(), Query::new(), "created_at"));
    FeedPaginator::new(source, page_size).with_cache(
        ctx.coordinator.cache().clone(),
        ctx.key("feed"),
        ctx.ttl.feed,
    )
}
