use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};
use thiserror::Error;

use crate::domain::models::{
    Entry, EntryWithFeed, Feed, FeedCache, NewEntry, RecentEntriesOptions, SortField,
};

/// Fallback count returned by `GetRecentEntries`/`GetRecentEntriesWithOptions`
/// when the time-windowed query comes back empty, per spec §4.4.
const FALLBACK_LIMIT: i64 = 50;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("feed not found")]
    FeedNotFound,
    #[error("feed with this url already exists")]
    DuplicateUrl,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The embedded SQLite-backed store: feeds, entries, cache metadata.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new feed with `next_fetch` set to now. Fails with
    /// [`StoreError::DuplicateUrl`] if the URL is already registered.
    pub async fn add_feed(&self, url: &str, title: &str) -> Result<Feed, StoreError> {
        let now = Utc::now();
        let result = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (url, title, active, fetch_error_count, next_fetch, fetch_interval)
            VALUES (?, ?, 1, 0, ?, 1800)
            RETURNING *
            "#,
        )
        .bind(url)
        .bind(title)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(feed) => Ok(feed),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateUrl)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::FeedNotFound)
    }

    pub async fn get_feed_by_id(&self, id: i64) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::FeedNotFound)
    }

    /// All feeds, optionally filtered to `active = true`, ordered by id.
    pub async fn get_feeds(&self, active_only: bool) -> Result<Vec<Feed>, StoreError> {
        let feeds = if active_only {
            sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE active = 1 ORDER BY id")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_as::<_, Feed>("SELECT * FROM feeds ORDER BY id")
                .fetch_all(&self.pool)
                .await?
        };
        Ok(feeds)
    }

    pub async fn update_feed(
        &self,
        id: i64,
        title: &str,
        link: Option<&str>,
        updated: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE feeds SET title = ?, link = ?, updated = ? WHERE id = ?")
            .bind(title)
            .bind(link)
            .bind(updated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rewrite a feed's URL after a permanent (301/308) redirect. Clears the
    /// cache validators, since they were issued against the old URL.
    pub async fn update_feed_url(&self, id: i64, new_url: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE feeds SET url = ?, etag = NULL, last_modified = NULL WHERE id = ?",
        )
        .bind(new_url)
        .bind(id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateUrl)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a per-feed config override (spec §6) to the feed registered at
    /// `url`: `fetch_interval` and/or `active`, whichever are `Some`. A
    /// no-op for fields left `None`. Fails with [`StoreError::FeedNotFound`]
    /// if no feed is registered at that URL yet, so the caller can decide
    /// whether to log and continue or treat it as fatal.
    pub async fn apply_feed_override(
        &self,
        url: &str,
        fetch_interval: Option<i64>,
        active: Option<bool>,
    ) -> Result<(), StoreError> {
        let feed = self.get_feed_by_url(url).await?;
        let fetch_interval = fetch_interval.unwrap_or(feed.fetch_interval);
        let active = active.unwrap_or(feed.active);

        sqlx::query("UPDATE feeds SET fetch_interval = ?, active = ? WHERE id = ?")
            .bind(fetch_interval)
            .bind(active)
            .bind(feed.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store cache validators verbatim and clear error state after a
    /// successful 200 or 304.
    pub async fn update_feed_cache(&self, id: i64, cache: &FeedCache) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET etag = ?, last_modified = ?, last_fetched = ?,
                fetch_error = NULL, fetch_error_count = 0
            WHERE id = ?
            "#,
        )
        .bind(&cache.etag)
        .bind(&cache.last_modified)
        .bind(cache.last_fetched)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a fetch failure: set the error message, increment the error
    /// counter, and advance `last_fetched` so the feed isn't retried in a
    /// tight loop.
    pub async fn update_feed_error(&self, id: i64, message: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE feeds
            SET fetch_error = ?, fetch_error_count = fetch_error_count + 1, last_fetched = ?
            WHERE id = ?
            "#,
        )
        .bind(message)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a feed; foreign-key cascade removes its entries.
    pub async fn remove_feed(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::FeedNotFound);
        }
        Ok(())
    }

    /// Insert `entry` under `feed_id`, or update its mutable fields on
    /// conflict. `first_seen` and `published` are set once, at first
    /// insertion, and never touched again.
    pub async fn upsert_entry(
        &self,
        feed_id: i64,
        entry: &NewEntry,
        fetch_time: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO entries
                (feed_id, entry_id, title, link, author, published, updated,
                 content, content_type, summary, first_seen)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_id, entry_id) DO UPDATE SET
                title = excluded.title,
                link = excluded.link,
                author = excluded.author,
                updated = excluded.updated,
                content = excluded.content,
                content_type = excluded.content_type,
                summary = excluded.summary
            "#,
        )
        .bind(feed_id)
        .bind(&entry.entry_id)
        .bind(&entry.title)
        .bind(&entry.link)
        .bind(&entry.author)
        .bind(entry.published)
        .bind(entry.updated)
        .bind(&entry.content)
        .bind(&entry.content_type)
        .bind(&entry.summary)
        .bind(fetch_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Entries from active feeds published within the last `days`, newest
    /// first; falls back to the 50 newest entries from active feeds when
    /// that window is empty.
    pub async fn get_recent_entries(&self, days: i64) -> Result<Vec<EntryWithFeed>, StoreError> {
        self.get_recent_entries_with_options(RecentEntriesOptions {
            days,
            filter_by_first_seen: false,
            sort_by: SortField::Published,
        })
        .await
    }

    /// Same shape as [`Store::get_recent_entries`], but the cutoff predicate
    /// and the sort column are independently selectable from the closed
    /// [`SortField`] set — never from a raw caller-supplied string.
    pub async fn get_recent_entries_with_options(
        &self,
        options: RecentEntriesOptions,
    ) -> Result<Vec<EntryWithFeed>, StoreError> {
        let filter_column = if options.filter_by_first_seen {
            "first_seen"
        } else {
            "published"
        };
        let sort_column = options.sort_by.column();
        let cutoff = Utc::now() - Duration::days(options.days);

        let windowed = self
            .query_entries_with_feed(
                &format!(
                    "SELECT entries.*, feeds.title AS feed_title, feeds.link AS feed_link
                     FROM entries
                     JOIN feeds ON feeds.id = entries.feed_id
                     WHERE feeds.active = 1 AND entries.{filter_column} >= ?
                     ORDER BY entries.{sort_column} DESC"
                ),
                cutoff,
                None,
            )
            .await?;

        if !windowed.is_empty() {
            return Ok(windowed);
        }

        self.query_entries_with_feed(
            &format!(
                "SELECT entries.*, feeds.title AS feed_title, feeds.link AS feed_link
                 FROM entries
                 JOIN feeds ON feeds.id = entries.feed_id
                 WHERE feeds.active = 1
                 ORDER BY entries.{sort_column} DESC
                 LIMIT ?"
            ),
            cutoff,
            Some(FALLBACK_LIMIT),
        )
        .await
    }

    async fn query_entries_with_feed(
        &self,
        sql_with_cutoff_or_limit: &str,
        cutoff: DateTime<Utc>,
        limit: Option<i64>,
    ) -> Result<Vec<EntryWithFeed>, StoreError> {
        let mut query = sqlx::query(sql_with_cutoff_or_limit);
        query = match limit {
            Some(n) => query.bind(n),
            None => query.bind(cutoff),
        };
        let rows = query.fetch_all(&self.pool).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = Entry {
                id: row.try_get("id")?,
                feed_id: row.try_get("feed_id")?,
                entry_id: row.try_get("entry_id")?,
                title: row.try_get("title")?,
                link: row.try_get("link")?,
                author: row.try_get("author")?,
                published: row.try_get("published")?,
                updated: row.try_get("updated")?,
                content: row.try_get("content")?,
                content_type: row.try_get("content_type")?,
                summary: row.try_get("summary")?,
                first_seen: row.try_get("first_seen")?,
            };
            out.push(EntryWithFeed {
                entry,
                feed_title: row.try_get("feed_title")?,
                feed_link: row.try_get("feed_link")?,
            });
        }
        Ok(out)
    }

    pub async fn count_entries(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_recent_entries(&self, days: i64) -> Result<i64, StoreError> {
        let cutoff = Utc::now() - Duration::days(days);
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM entries WHERE published >= ?")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    pub async fn get_entry_count_for_feed(&self, feed_id: i64) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Delete entries published before `now - days`. Feed metadata is left
    /// untouched. Returns the number of rows deleted.
    pub async fn prune_old_entries(&self, days: i64) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - Duration::days(days);
        let result = sqlx::query("DELETE FROM entries WHERE published < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
