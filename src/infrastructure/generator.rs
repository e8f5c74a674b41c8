use std::path::PathBuf;

use askama::Template;
use chrono::Utc;
use thiserror::Error;

use crate::domain::models::RecentEntriesOptions;
use crate::infrastructure::store::{Store, StoreError};
use crate::web::assets;
use crate::web::filters::date_group_label;
use crate::web::templates::{DateGroup, EntryView, IndexTemplate};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the Generator needs to know about the desired output, per
/// spec §4.6. The Store is consulted but never mutated.
pub struct RenderDescriptor {
    pub planet_title: String,
    pub subtitle: String,
    pub site_link: Option<String>,
    pub owner_name: String,
    pub owner_email: String,
    pub output_dir: PathBuf,
    pub days: i64,
    pub group_by_date: bool,
    pub filter_by_first_seen: bool,
    pub sort_by: crate::domain::models::SortField,
    /// Source static asset tree to copy alongside `index.html`, if any.
    pub static_source_dir: Option<PathBuf>,
}

/// Render the planet page: query recent entries and active feeds from the
/// Store, render the template, and write `index.html` (plus an optional
/// `static/` subtree) into the output directory. Never writes to the Store.
pub async fn generate(store: &Store, descriptor: &RenderDescriptor) -> Result<(), GenerateError> {
    let entries = store
        .get_recent_entries_with_options(RecentEntriesOptions {
            days: descriptor.days,
            filter_by_first_seen: descriptor.filter_by_first_seen,
            sort_by: descriptor.sort_by,
        })
        .await?;
    let feeds = store.get_feeds(true).await?;

    let views: Vec<EntryView> = entries
        .into_iter()
        .map(|e| EntryView {
            title: e.entry.title,
            link: e.entry.link,
            author: e.entry.author,
            published: e.entry.published,
            content: e.entry.content,
            summary: e.entry.summary,
            feed_title: e.feed_title,
            feed_link: e.feed_link,
        })
        .collect();

    let (groups, flat) = if descriptor.group_by_date {
        (group_by_date(views), Vec::new())
    } else {
        (Vec::new(), views)
    };

    let template = IndexTemplate {
        planet_title: descriptor.planet_title.clone(),
        subtitle: descriptor.subtitle.clone(),
        site_link: descriptor.site_link.clone(),
        owner_name: descriptor.owner_name.clone(),
        owner_email: descriptor.owner_email.clone(),
        groups,
        entries: flat,
        feeds,
        generated_at: Utc::now(),
    };

    let rendered = template.render()?;

    std::fs::create_dir_all(&descriptor.output_dir)?;
    std::fs::write(descriptor.output_dir.join("index.html"), rendered)?;

    if let Some(source) = &descriptor.static_source_dir {
        assets::copy_static_assets(source, &descriptor.output_dir.join("static"))?;
    }

    Ok(())
}

/// Bucket entries by local calendar date, newest group first, entries
/// within each group already ordered newest-first by the Store query.
fn group_by_date(entries: Vec<EntryView>) -> Vec<DateGroup> {
    let mut groups: Vec<DateGroup> = Vec::new();
    for entry in entries {
        let label = date_group_label(&entry.published).unwrap_or_default();
        match groups.last_mut() {
            Some(group) if group.label == label => group.entries.push(entry),
            _ => groups.push(DateGroup {
                label,
                entries: vec![entry],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SortField;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::tempdir;

    async fn test_store() -> Store {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        Store::new(pool)
    }

    #[tokio::test]
    async fn writes_index_html_with_csp_meta_tag() {
        let store = test_store().await;
        let feed = store
            .add_feed("https://example.com/feed", "Example")
            .await
            .unwrap();
        store
            .upsert_entry(
                feed.id,
                &crate::domain::models::NewEntry {
                    entry_id: "e1".to_string(),
                    title: "Hello".to_string(),
                    link: Some("https://example.com/hello".to_string()),
                    author: None,
                    published: Utc::now(),
                    updated: Utc::now(),
                    content: Some("<p>hi</p>".to_string()),
                    content_type: "html".to_string(),
                    summary: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let out = tempdir().unwrap();
        let descriptor = RenderDescriptor {
            planet_title: "My Planet".to_string(),
            subtitle: "aggregated".to_string(),
            site_link: None,
            owner_name: "Owner".to_string(),
            owner_email: String::new(),
            output_dir: out.path().to_path_buf(),
            days: 30,
            group_by_date: true,
            filter_by_first_seen: false,
            sort_by: SortField::Published,
            static_source_dir: None,
        };

        generate(&store, &descriptor).await.unwrap();

        let html = std::fs::read_to_string(out.path().join("index.html")).unwrap();
        assert!(html.contains("script-src 'self'"));
        assert!(html.contains("Hello"));
        assert!(html.contains("My Planet"));
    }

    #[tokio::test]
    async fn copies_static_assets_alongside_the_page() {
        let store = test_store().await;
        let out = tempdir().unwrap();
        let static_source = tempdir().unwrap();
        std::fs::write(static_source.path().join("style.css"), "body{}").unwrap();

        let descriptor = RenderDescriptor {
            planet_title: "Empty Planet".to_string(),
            subtitle: String::new(),
            site_link: None,
            owner_name: String::new(),
            owner_email: String::new(),
            output_dir: out.path().to_path_buf(),
            days: 30,
            group_by_date: false,
            filter_by_first_seen: false,
            sort_by: SortField::Published,
            static_source_dir: Some(static_source.path().to_path_buf()),
        };

        generate(&store, &descriptor).await.unwrap();

        assert!(out.path().join("static").join("style.css").exists());
    }
}
