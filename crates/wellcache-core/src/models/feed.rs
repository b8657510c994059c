use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::mapping::{MappingError, RowMapping, RowReader};
use crate::remote::Row;

/// A post in the social feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub author: String,
    pub body: String,
    #[serde(rename = "likeCount", default)]
    pub like_count: u32,
    #[serde(rename = "createdAt", with = "crate::codec::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl RowMapping for FeedPost {
    const RESOURCE: &'static str = "feed_posts";

    fn from_row(row: &Row) -> Result<Self, MappingError> {
        let reader = RowReader::new(Self::RESOURCE, row)?;
        Ok(FeedPost {
            id: reader.id("id")?.ok_or(MappingError::MissingField {
                resource: Self::RESOURCE,
                field: "id",
            })?,
            author: reader.string("author")?,
            body: reader.string("body")?,
            like_count: reader.opt_u32("like_count")?.unwrap_or(0),
            created_at: reader.timestamp("created_at")?,
        })
    }

    fn to_row(&self) -> Row {
        json!({
            "id": self.id,
            "author": self.author,
            "body": self.body,
            "like_count": self.like_count,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}
