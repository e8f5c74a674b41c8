use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A subscribed feed, identified by primary key and by its (unique) URL.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub link: Option<String>,
    pub updated: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_error: Option<String>,
    pub fetch_error_count: i64,
    pub next_fetch: Option<DateTime<Utc>>,
    pub active: bool,
    pub fetch_interval: i64,
}

/// Conditional-request validators carried between fetch cycles, echoed
/// verbatim into the next request's `If-None-Match` / `If-Modified-Since`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCache {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
}

/// A single post/item within a feed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub entry_id: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub content: Option<String>,
    pub content_type: String,
    pub summary: Option<String>,
    pub first_seen: DateTime<Utc>,
}

/// A canonical entry as produced by the normalizer, ready to be upserted.
/// Distinct from [`Entry`] because it has no database identity yet and no
/// `first_seen` (that is decided by the store on first insertion).
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub entry_id: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub content: Option<String>,
    pub content_type: String,
    pub summary: Option<String>,
}

/// Feed-level metadata extracted by the normalizer from a parsed document.
#[derive(Debug, Clone, Default)]
pub struct FeedMetadata {
    pub title: String,
    pub link: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

/// The column `GetRecentEntriesWithOptions` filters and sorts by. A closed
/// set so the store never interpolates a caller-controlled identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Published,
    FirstSeen,
}

impl SortField {
    pub fn column(self) -> &'static str {
        match self {
            SortField::Published => "published",
            SortField::FirstSeen => "first_seen",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "published" => Some(SortField::Published),
            "first_seen" => Some(SortField::FirstSeen),
            _ => None,
        }
    }
}

/// Options for [`crate::infrastructure::store::Store::get_recent_entries_with_options`].
#[derive(Debug, Clone, Copy)]
pub struct RecentEntriesOptions {
    pub days: i64,
    pub filter_by_first_seen: bool,
    pub sort_by: SortField,
}

/// An entry paired with the feed it belongs to, for rendering.
#[derive(Debug, Clone)]
pub struct EntryWithFeed {
    pub entry: Entry,
    pub feed_title: String,
    pub feed_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_field_parse_rejects_unknown_values() {
        assert!(SortField::parse("published").is_some());
        assert!(SortField::parse("first_seen").is_some());
        assert!(SortField::parse("id").is_none());
        assert!(SortField::parse("").is_none());
    }

    #[test]
    fn sort_field_column_matches_schema() {
        assert_eq!(SortField::Published.column(), "published");
        assert_eq!(SortField::FirstSeen.column(), "first_seen");
    }
}
