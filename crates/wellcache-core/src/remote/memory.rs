use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{Query, RemoteDataService, RemoteError, Row};

/// In-process remote store.
///
/// Writes upsert by `"id"`, assigning a fresh string id when the payload has
/// none. Reads and writes can be made to fail for rollback testing.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    next_id: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert rows as-is, bypassing id assignment.
    pub fn seed(&self, resource: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(resource.to_string()).or_default().extend(rows);
    }

    pub fn rows(&self, resource: &str) -> Vec<Row> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(resource).cloned().unwrap_or_default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn compare_field(a: &Row, b: &Row, field: &str) -> CmpOrdering {
    match (a.get(field), b.get(field)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => CmpOrdering::Greater,
        (None, Some(_)) => CmpOrdering::Less,
        _ => CmpOrdering::Equal,
    }
}

#[async_trait]
impl RemoteDataService for MemoryRemote {
    async fn read(&self, resource: &str, query: &Query) -> Result<Vec<Row>, RemoteError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable(format!("read {}", resource)));
        }

        let mut rows: Vec<Row> = self
            .rows(resource)
            .into_iter()
            .filter(|row| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| row.get(field) == Some(value))
            })
            .collect();

        if let Some(field) = &query.order_desc {
            rows.sort_by(|a, b| compare_field(b, a, field));
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn write(&self, resource: &str, payload: Row) -> Result<Row, RemoteError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable(format!("write {}", resource)));
        }

        let Value::Object(mut record) = payload else {
            return Err(RemoteError::InvalidResponse(format!(
                "{} payload must be a JSON object",
                resource
            )));
        };

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let table = tables.entry(resource.to_string()).or_default();

        let id = match record.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let next = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let id = Value::String(format!("{}-{}", resource, next));
                record.insert("id".to_string(), id.clone());
                id
            }
        };

        let committed = Value::Object(record);
        match table.iter_mut().find(|row| row.get("id") == Some(&id)) {
            Some(existing) => *existing = committed.clone(),
            None => table.push(committed.clone()),
        }
        Ok(committed)
    }
}
