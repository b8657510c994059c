//! REST client for the managed backend.
//!
//! Speaks the PostgREST dialect: `GET /rest/v1/<table>?col=eq.val&order=col.desc`
//! for reads and `POST /rest/v1/<table>` with an upsert preference for writes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Query, RemoteDataService, RemoteError, Row};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix of the table endpoints.
const REST_PATH: &str = "rest/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Ask for the committed row back and merge on primary-key conflict.
const UPSERT_PREFERENCE: &str = "return=representation,resolution=merge-duplicates";

/// Remote data service over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
    api_key: String,
    token: Option<String>,
}

impl HttpRemote {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            token: None,
        })
    }

    /// A client acting for a signed-in user, sharing the connection pool.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            token: Some(token.to_string()),
        }
    }

    fn table_url(&self, resource: &str) -> String {
        format!("{}/{}/{}", self.base_url, REST_PATH, resource)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header(header::ACCEPT, "application/json")
    }

    /// Send a request, backing off and retrying while rate limited.
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.authorized(build()).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if status.as_u16() != 429 {
                let body = response.text().await.unwrap_or_default();
                return Err(RemoteError::from_status(status, &body));
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(RemoteError::RateLimited);
            }
            warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }
    }
}

/// Render a filter value the way PostgREST expects it in a query string.
fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Query-string parameters for a read.
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = query
        .filters
        .iter()
        .map(|(field, value)| {
            let op = if value.is_null() { "is" } else { "eq" };
            (field.clone(), format!("{}.{}", op, filter_literal(value)))
        })
        .collect();

    if let Some(field) = &query.order_desc {
        params.push(("order".to_string(), format!("{}.desc", field)));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

#[async_trait]
impl RemoteDataService for HttpRemote {
    async fn read(&self, resource: &str, query: &Query) -> Result<Vec<Row>, RemoteError> {
        let url = self.table_url(resource);
        let params = query_params(query);
        debug!(url = %url, ?params, "Remote read");

        let response = self
            .send(|| self.client.get(&url).query(&params))
            .await?;
        let body: Value = response.json().await?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(RemoteError::InvalidResponse(format!(
                "expected an array from {}, got {}",
                resource, other
            ))),
        }
    }

    async fn write(&self, resource: &str, payload: Row) -> Result<Row, RemoteError> {
        let url = self.table_url(resource);
        debug!(url = %url, "Remote write");

        let response = self
            .send(|| {
                self.client
                    .post(&url)
                    .header("Prefer", UPSERT_PREFERENCE)
                    .json(&payload)
            })
            .await?;

        // PostgREST answers a representation request with a one-element array.
        let body: Value = response.json().await?;
        match body {
            Value::Array(mut rows) if rows.len() == 1 => Ok(rows.remove(0)),
            Value::Object(_) => Ok(body),
            other => Err(RemoteError::InvalidResponse(format!(
                "expected the committed {} row, got {}",
                resource, other
            ))),
        }
    }
}
