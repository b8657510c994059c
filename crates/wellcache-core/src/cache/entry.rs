use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A payload together with the time the cache stored it.
///
/// This is also the on-disk envelope: `{"value": ..., "storedAt": "..."}`.
/// `stored_at` is only ever assigned by the cache store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(rename = "storedAt")]
    pub stored_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(value: T, stored_at: DateTime<Utc>) -> Self {
        Self { value, stored_at }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    /// Stale once strictly older than `ttl`. An entry stamped in the future
    /// (clock skew) is never stale.
    pub fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.age(now) > ttl
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        age_display(self.age(now))
    }
}

/// Human-readable age, e.g. "just now", "5m ago", "2h ago", "3d ago".
pub fn age_display(age: Duration) -> String {
    let minutes = age.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}
