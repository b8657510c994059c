use std::sync::Arc;

use chrono::Duration;

use crate::mapping::{rows_to, RowMapping};
use crate::models::{EntryKind, HistoryList, LogEntry};
use crate::mutation::{Committed, LoadSource, ManagedResource};
use crate::remote::{Query, RemoteDataService, RemoteError};

use super::{FeatureContext, FeatureError};

/// The signed-in user's log history.
pub struct HistoryFeature {
    ctx: FeatureContext,
    history: ManagedResource<HistoryList>,
}

impl HistoryFeature {
    pub fn new(ctx: FeatureContext) -> Self {
        let history = ctx.coordinator.manage(ctx.key("history"), HistoryList::default());
        Self { ctx, history }
    }

    pub fn resource(&self) -> &ManagedResource<HistoryList> {
        &self.history
    }

    pub fn current(&self) -> HistoryList {
        self.history.current()
    }

    pub async fn load(&self) -> Result<LoadSource, RemoteError> {
        let remote = self.ctx.remote.clone();
        let user_id = self.ctx.user_id.clone();
        self.ctx
            .coordinator
            .load(&self.history, self.ctx.ttl.history, move || fetch_history(remote, user_id))
            .await
    }

    /// Log a new entry. It shows up at once; its id arrives with the commit.
    pub async fn log_entry(
        &self,
        kind: EntryKind,
        note: impl Into<String>,
        mood: Option<u8>,
    ) -> Result<Committed<HistoryList>, FeatureError> {
        let entry = LogEntry {
            id: None,
            user_id: self.ctx.require_user()?.to_string(),
            kind,
            note: note.into(),
            mood,
            logged_at: self.ctx.coordinator.cache().now(),
        };

        let remote = self.ctx.remote.clone();
        let pending = entry.clone();
        let committed = self
            .ctx
            .coordinator
            .mutate_queued(
                &self.history,
                move |list| list.with_entry(entry),
                move |p| insert_entry(remote, p.optimistic, pending),
            )
            .await?;
        Ok(committed)
    }

    /// Time since the newest logged entry.
    pub fn time_since_last(&self) -> Option<Duration> {
        self.history.current().time_since_latest(self.ctx.coordinator.cache().now())
    }
}

async fn fetch_history(
    remote: Arc<dyn RemoteDataService>,
    user_id: Option<String>,
) -> Result<HistoryList, RemoteError> {
    let Some(user_id) = user_id else {
        return Ok(HistoryList::default());
    };
    let query = Query::new().eq("user_id", user_id).order_desc("logged_at");
    let rows = remote.read(LogEntry::RESOURCE, &query).await?;
    Ok(HistoryList::from_entries(rows_to::<LogEntry>(&rows)?))
}

async fn insert_entry(
    remote: Arc<dyn RemoteDataService>,
    list: HistoryList,
    pending: LogEntry,
) -> Result<HistoryList, RemoteError> {
    let row = remote.write(LogEntry::RESOURCE, pending.to_row()).await?;
    let committed = LogEntry::from_row(&row)?;
    Ok(list.with_committed(&pending, committed))
}
