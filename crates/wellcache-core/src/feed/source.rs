use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::mapping::{rows_to, RowMapping};
use crate::remote::{Query, RemoteDataService, RemoteError};

/// Something that can serve one page of a newest-first list.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<T>, RemoteError>;
}

/// Pages of a remote table, newest first by `order_field`.
pub struct RemoteFeedSource<T> {
    remote: Arc<dyn RemoteDataService>,
    base: Query,
    order_field: &'static str,
    _rows: PhantomData<fn() -> T>,
}

impl<T> RemoteFeedSource<T> {
    /// `base` carries the filters; ordering and range are added per page.
    pub fn new(remote: Arc<dyn RemoteDataService>, base: Query, order_field: &'static str) -> Self {
        Self {
            remote,
            base,
            order_field,
            _rows: PhantomData,
        }
    }
}

#[async_trait]
impl<T> PageSource<T> for RemoteFeedSource<T>
where
    T: RowMapping + Send + 'static,
{
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<T>, RemoteError> {
        let query = self
            .base
            .clone()
            .order_desc(self.order_field)
            .range(offset, limit);
        let rows = self.remote.read(T::RESOURCE, &query).await?;
        Ok(rows_to::<T>(&rows)?)
    }
}
