use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::mapping::{MappingError, RowMapping, RowReader};
use crate::remote::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Meal,
    Workout,
}

impl PlanKind {
    /// Number of days a generated plan covers.
    pub fn days(&self) -> u32 {
        match self {
            PlanKind::Meal => 7,
            PlanKind::Workout => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Meal => "meal",
            PlanKind::Workout => "workout",
        }
    }

    /// Logical cache resource name.
    pub fn cache_resource(&self) -> &'static str {
        match self {
            PlanKind::Meal => "meal-plan",
            PlanKind::Workout => "workout-plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "meal" => Some(PlanKind::Meal),
            "workout" => Some(PlanKind::Workout),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDay {
    pub day: u32,
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub completed: bool,
}

/// A generated multi-day plan. Regeneration replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDocument {
    /// Assigned by the remote store on first write.
    pub id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub kind: PlanKind,
    pub days: Vec<PlanDay>,
    #[serde(rename = "generatedAt", with = "crate::codec::timestamp")]
    pub generated_at: DateTime<Utc>,
}

impl PlanDocument {
    /// Copy of the plan with `day` marked as done. Unknown days leave the
    /// plan unchanged.
    pub fn complete_day(&self, day: u32) -> PlanDocument {
        self.with_day_completed(day, true)
    }

    pub fn with_day_completed(&self, day: u32, completed: bool) -> PlanDocument {
        let mut next = self.clone();
        if let Some(d) = next.days.iter_mut().find(|d| d.day == day) {
            d.completed = completed;
        }
        next
    }

    pub fn has_day(&self, day: u32) -> bool {
        self.days.iter().any(|d| d.day == day)
    }

    pub fn completed_count(&self) -> usize {
        self.days.iter().filter(|d| d.completed).count()
    }

    /// Fraction of days completed, 0.0 for an empty plan.
    pub fn progress(&self) -> f64 {
        if self.days.is_empty() {
            0.0
        } else {
            self.completed_count() as f64 / self.days.len() as f64
        }
    }
}

fn day_from_value(value: &Value) -> Result<PlanDay, MappingError> {
    let reader = RowReader::new("plan_days", value)?;
    Ok(PlanDay {
        day: reader.u32("day")?,
        title: reader.string("title")?,
        details: reader.opt_string("details")?.unwrap_or_default(),
        completed: reader.bool("completed")?,
    })
}

impl RowMapping for PlanDocument {
    const RESOURCE: &'static str = "plans";

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        let reader = RowReader::new(Self::RESOURCE, row)?;
        let kind = PlanKind::parse(&reader.string("kind")?).ok_or(MappingError::InvalidField {
            resource: Self::RESOURCE,
            field: "kind",
            expected: "\"meal\" or \"workout\"",
        })?;
        let days = reader
            .array("days")?
            .iter()
            .map(day_from_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PlanDocument {
            id: reader.id("id")?,
            user_id: reader.string("user_id")?,
            kind,
            days,
            generated_at: reader.timestamp("created_at")?,
        })
    }

    fn to_row(&self) -> Row {
        let days: Vec<Value> = self
            .days
            .iter()
            .map(|d| {
                json!({
                    "day": d.day,
                    "title": d.title,
                    "details": d.details,
                    "completed": d.completed,
                })
            })
            .collect();

        let mut row = json!({
            "user_id": self.user_id,
            "kind": self.kind.as_str(),
            "days": days,
            "created_at": self.generated_at.to_rfc3339(),
        });
        if let Some(id) = &self.id {
            row["id"] = Value::String(id.clone());
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan() -> PlanDocument {
        PlanDocument {
            id: Some("p1".into()),
            user_id: "u1".into(),
            kind: PlanKind::Meal,
            days: (1..=7)
                .map(|day| PlanDay {
                    day,
                    title: format!("Day {}", day),
                    details: String::new(),
                    completed: false,
                })
                .collect(),
            generated_at: Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_complete_day_is_pure() {
        let original = plan();
        let next = original.complete_day(3);
        assert_eq!(original.completed_count(), 0);
        assert_eq!(next.completed_count(), 1);
        assert!(next.days[2].completed);
        assert_eq!(original.complete_day(99), original);
    }

    #[test]
    fn test_progress() {
        let p = plan().complete_day(1).complete_day(2);
        assert!((p.progress() - 2.0 / 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_row_mapping_both_ways() {
        let original = plan().complete_day(5);
        let row = original.to_row();
        assert_eq!(row["kind"], "meal");
        assert_eq!(row["days"][4]["completed"], true);
        assert_eq!(PlanDocument::from_row(&row).unwrap(), original);
    }

    #[test]
    fn test_row_missing_field_fails_loudly() {
        let mut row = plan().to_row();
        row.as_object_mut().unwrap().remove("user_id");
        assert_eq!(
            PlanDocument::from_row(&row),
            Err(MappingError::MissingField {
                resource: "plans",
                field: "user_id"
            })
        );

        let mut row = plan().to_row();
        row["days"][0].as_object_mut().unwrap().remove("completed");
        assert!(matches!(
            PlanDocument::from_row(&row),
            Err(MappingError::MissingField { resource: "plan_days", field: "completed" })
        ));
    }

    #[test]
    fn test_cached_json_rehydrates_timestamp() {
        let json = r#"{"id":null,"userId":"u1","kind":"workout","days":[],"generatedAt":"2024-06-01 07:00:00"}"#;
        let parsed: PlanDocument = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.generated_at, Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap());
        assert_eq!(parsed.kind, PlanKind::Workout);
    }
}
