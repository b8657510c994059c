//! The remote data store, treated as the source of truth.
//!
//! The cache layer only needs two operations, `read` and `write`, addressed
//! by resource (table) name. Rows travel as JSON objects; typed conversion
//! happens in [`crate::mapping`].
//!
//! - `HttpRemote`: PostgREST-style REST backend over `reqwest`
//! - `MemoryRemote`: in-process store with failure injection

pub mod error;
pub mod http;
pub mod memory;

pub use error::RemoteError;
pub use http::HttpRemote;
pub use memory::MemoryRemote;

use async_trait::async_trait;
use serde_json::Value;

/// One record as returned by the remote store.
pub type Row = Value;

/// Read filters: equality constraints, descending order, offset/limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<(String, Value)>,
    pub order_desc: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_desc(mut self, field: &str) -> Self {
        self.order_desc = Some(field.to_string());
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }
}

#[async_trait]
pub trait RemoteDataService: Send + Sync {
    async fn read(&self, resource: &str, query: &Query) -> Result<Vec<Row>, RemoteError>;

    /// Insert or update one record and return it as committed, including any
    /// server-assigned fields.
    async fn write(&self, resource: &str, payload: Row) -> Result<Row, RemoteError>;
}
