use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::models::{Feed, FeedCache};
use crate::infrastructure::fetcher::{FetchError, Fetcher};
use crate::infrastructure::normalizer;
use crate::infrastructure::store::Store;

/// Retry attempts given to each feed's `FetchWithRetry` call, per cycle.
const MAX_ATTEMPTS: u32 = 2;

/// The outcome of processing a single feed during an update cycle.
#[derive(Debug)]
pub enum FeedOutcome {
    Updated { new_or_changed_entries: usize },
    NotModified,
    Failed { feed_id: i64, message: String },
}

/// Runs one update cycle: fetch, normalize, and store every active feed,
/// bounded to `concurrency` feeds in flight at once. Each feed's work is
/// independent — one feed's failure never aborts another's — matching
/// spec §4.5/§5's per-feed isolation and collection-and-join model.
pub struct Dispatcher {
    store: Store,
    fetcher: Arc<Fetcher>,
}

impl Dispatcher {
    pub fn new(store: Store, fetcher: Fetcher) -> Self {
        Self {
            store,
            fetcher: Arc::new(fetcher),
        }
    }

    pub async fn update_all(
        &self,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<FeedOutcome>, crate::infrastructure::store::StoreError> {
        let feeds = self.store.get_feeds(true).await?;
        tracing::info!(feed_count = feeds.len(), "starting update cycle");

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for feed in feeds {
            let store = self.store.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();

            tasks.spawn(async move {
                if cancel.is_cancelled() {
                    return FeedOutcome::Failed {
                        feed_id: feed.id,
                        message: "cancelled before dispatch".to_string(),
                    };
                }
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FeedOutcome::Failed {
                            feed_id: feed.id,
                            message: "semaphore closed".to_string(),
                        }
                    }
                };
                process_feed(&store, &fetcher, feed, &cancel).await
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "feed task panicked");
                }
            }
        }

        tracing::info!("update cycle complete");
        Ok(outcomes)
    }
}

async fn process_feed(
    store: &Store,
    fetcher: &Fetcher,
    feed: Feed,
    cancel: &CancellationToken,
) -> FeedOutcome {
    let cache = FeedCache {
        etag: feed.etag.clone(),
        last_modified: feed.last_modified.clone(),
        last_fetched: feed.last_fetched,
    };

    let response = match fetcher
        .fetch_with_retry(&feed.url, &cache, MAX_ATTEMPTS, cancel)
        .await
    {
        Ok(response) => response,
        Err(err) => return record_fetch_error(store, &feed, &err).await,
    };

    if response.permanent_redirect && response.final_url != feed.url {
        tracing::info!(
            feed_id = feed.id,
            old_url = %feed.url,
            new_url = %response.final_url,
            "permanent redirect, rewriting feed url"
        );
        if let Err(e) = store.update_feed_url(feed.id, &response.final_url).await {
            tracing::warn!(feed_id = feed.id, error = %e, "failed to rewrite feed url");
        }
    }

    if response.not_modified {
        if let Err(e) = store.update_feed_cache(feed.id, &response.new_cache).await {
            tracing::warn!(feed_id = feed.id, error = %e, "failed to update feed cache");
        }
        return FeedOutcome::NotModified;
    }

    let fetch_time = response.fetched_at;
    let (metadata, entries) = match normalizer::parse(&response.body, &response.final_url, fetch_time)
    {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(feed_id = feed.id, error = %e, "invalid feed document");
            if let Err(store_err) = store.update_feed_error(feed.id, &e.to_string()).await {
                tracing::error!(feed_id = feed.id, error = %store_err, "failed to record fetch error");
            }
            return FeedOutcome::Failed {
                feed_id: feed.id,
                message: e.to_string(),
            };
        }
    };

    if let Err(e) = store
        .update_feed(feed.id, &metadata.title, metadata.link.as_deref(), metadata.updated)
        .await
    {
        tracing::warn!(feed_id = feed.id, error = %e, "failed to update feed metadata");
    }

    let mut stored = 0;
    for entry in &entries {
        match store.upsert_entry(feed.id, entry, fetch_time).await {
            Ok(()) => stored += 1,
            Err(e) => {
                tracing::warn!(feed_id = feed.id, entry_id = %entry.entry_id, error = %e, "failed to upsert entry");
            }
        }
    }

    if let Err(e) = store.update_feed_cache(feed.id, &response.new_cache).await {
        tracing::warn!(feed_id = feed.id, error = %e, "failed to update feed cache");
    }

    tracing::info!(feed_id = feed.id, entries = stored, "feed updated");
    FeedOutcome::Updated {
        new_or_changed_entries: stored,
    }
}

async fn record_fetch_error(store: &Store, feed: &Feed, err: &FetchError) -> FeedOutcome {
    tracing::warn!(feed_id = feed.id, url = %feed.url, error = %err, "feed fetch failed");
    let message = err.to_string();
    if let Err(store_err) = store.update_feed_error(feed.id, &message).await {
        tracing::error!(feed_id = feed.id, error = %store_err, "failed to record fetch error");
    }
    FeedOutcome::Failed {
        feed_id: feed.id,
        message,
    }
}
