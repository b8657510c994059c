use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::age_display;
use crate::mapping::{MappingError, RowMapping, RowReader};
use crate::remote::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Journal,
    Workout,
    Meal,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Journal => "journal",
            EntryKind::Workout => "workout",
            EntryKind::Meal => "meal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "journal" => Some(EntryKind::Journal),
            "workout" => Some(EntryKind::Workout),
            "meal" => Some(EntryKind::Meal),
            _ => None,
        }
    }
}

/// One logged record: a journal entry, a finished workout, a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// `None` until the remote store assigns one.
    pub id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub kind: EntryKind,
    pub note: String,
    /// Self-reported mood, 1 to 5.
    #[serde(default)]
    pub mood: Option<u8>,
    #[serde(rename = "loggedAt", with = "crate::codec::timestamp")]
    pub logged_at: DateTime<Utc>,
}

impl RowMapping for LogEntry {
    const RESOURCE: &'static str = "log_entries";

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        let reader = RowReader::new(Self::RESOURCE, row)?;
        let kind = EntryKind::parse(&reader.string("kind")?).ok_or(MappingError::InvalidField {
            resource: Self::RESOURCE,
            field: "kind",
            expected: "\"journal\", \"workout\" or \"meal\"",
        })?;
        Ok(LogEntry {
            id: reader.id("id")?,
            user_id: reader.string("user_id")?,
            kind,
            note: reader.string("note")?,
            mood: reader.opt_u8("mood")?,
            logged_at: reader.timestamp("logged_at")?,
        })
    }

    fn to_row(&self) -> Row {
        let mut row = json!({
            "user_id": self.user_id,
            "kind": self.kind.as_str(),
            "note": self.note,
            "mood": self.mood,
            "logged_at": self.logged_at.to_rfc3339(),
        });
        if let Some(id) = &self.id {
            row["id"] = Value::String(id.clone());
        }
        row
    }
}

/// Log entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryList {
    pub entries: Vec<LogEntry>,
}

impl HistoryList {
    /// Build from entries in any order.
    pub fn from_entries(mut entries: Vec<LogEntry>) -> Self {
        entries.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
        Self { entries }
    }

    /// Copy with `entry` inserted at its chronological position. Among equal
    /// timestamps the new entry goes first.
    pub fn with_entry(&self, entry: LogEntry) -> Self {
        let mut entries = self.entries.clone();
        let at = entries
            .iter()
            .position(|e| e.logged_at <= entry.logged_at)
            .unwrap_or(entries.len());
        entries.insert(at, entry);
        Self { entries }
    }

    /// Copy with the first entry equal to `pending` replaced by `committed`.
    pub fn with_committed(&self, pending: &LogEntry, committed: LogEntry) -> Self {
        let mut entries = self.entries.clone();
        match entries.iter().position(|e| e == pending) {
            Some(at) => entries[at] = committed,
            None => entries.push(committed),
        }
        Self::from_entries(entries)
    }

    pub fn latest(&self) -> Option<&LogEntry> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time since the newest entry.
    pub fn time_since_latest(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.latest().map(|e| now - e.logged_at)
    }

    /// "3h ago" style label for the newest entry, or "never".
    pub fn last_logged_display(&self, now: DateTime<Utc>) -> String {
        self.time_since_latest(now)
            .map(age_display)
            .unwrap_or_else(|| "never".to_string())
    }
}
