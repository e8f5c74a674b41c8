use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous},
    Error as SqlxError,
};
use std::str::FromStr;

/// Open (creating if missing) the SQLite database at `url`, enable WAL
/// journaling for reader/writer concurrency, and turn on foreign-key
/// enforcement so `RemoveFeed` cascades to `entries`.
///
/// Every pragma here is set through `SqliteConnectOptions` rather than a
/// post-connect `PRAGMA` query, so it applies to every connection the pool
/// opens (up to `max_connections`), not just whichever one happens to serve
/// a one-shot query issued right after `connect_with`. A pool-wide
/// `PRAGMA foreign_keys = ON` query would only land on a single physical
/// connection, leaving cascade deletes silently disabled on every other
/// connection the dispatcher's concurrent feed tasks open.
pub async fn setup_database(url: &str) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .foreign_keys(true)
        .synchronous(SqliteSynchronous::Normal)
        .pragma("cache_size", "-64000")
        .pragma("temp_store", "MEMORY");

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
