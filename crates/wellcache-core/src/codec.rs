//! Serde helpers for rehydrating timestamps out of cached or remote JSON.
//!
//! The cache stores payloads as plain JSON and never looks inside them, so a
//! date written by one client may come back as an RFC 3339 string, a naive
//! `YYYY-MM-DD HH:MM:SS` string, or epoch milliseconds. Domain types that
//! compare or age their timestamps opt in with
//! `#[serde(with = "crate::codec::timestamp")]`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// Parse any of the accepted timestamp spellings.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn from_raw<E: serde::de::Error>(raw: RawTimestamp) -> Result<DateTime<Utc>, E> {
    match raw {
        RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| E::custom(format!("timestamp out of range: {}", ms))),
        RawTimestamp::Text(text) => parse_timestamp(&text)
            .ok_or_else(|| E::custom(format!("unrecognized timestamp: {}", text))),
    }
}

pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{from_raw, RawTimestamp};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        from_raw(RawTimestamp::deserialize(d)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "timestamp")]
        at: DateTime<Utc>,
    }

    #[test]
    fn test_accepts_all_spellings() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        for json in [
            r#"{"at":"2024-03-01T08:30:00Z"}"#,
            r#"{"at":"2024-03-01T09:30:00+01:00"}"#,
            r#"{"at":"2024-03-01 08:30:00"}"#,
            r#"{"at":"2024-03-01T08:30:00.000"}"#,
            r#"{"at":1709281800000}"#,
        ] {
            let parsed: Stamped = serde_json::from_str(json).unwrap();
            assert_eq!(parsed.at, expected, "input: {}", json);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at":"yesterday"}"#).is_err());
    }

    #[test]
    fn test_serializes_as_rfc3339() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let json = serde_json::to_value(Stamped { at }).unwrap();
        assert_eq!(json["at"], "2024-03-01T08:30:00.000Z");
    }
}
