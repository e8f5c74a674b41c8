use askama::Template;

use crate::domain::models::Feed;
use crate::web::filters;

/// One entry as rendered on the page: the canonical entry plus the feed it
/// came from, pre-joined so the template never has to look anything up.
pub struct EntryView {
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published: chrono::DateTime<chrono::Utc>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub feed_title: String,
    pub feed_link: Option<String>,
}

/// Entries bucketed by calendar date, newest group first, per spec §4.6.
pub struct DateGroup {
    pub label: String,
    pub entries: Vec<EntryView>,
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub planet_title: String,
    pub subtitle: String,
    pub site_link: Option<String>,
    pub owner_name: String,
    pub owner_email: String,
    /// Populated when rendering is grouped by date; empty otherwise.
    pub groups: Vec<DateGroup>,
    /// Populated when rendering is ungrouped; empty otherwise.
    pub entries: Vec<EntryView>,
    pub feeds: Vec<Feed>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}
