use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens the pool behind the plugin KV store, creating the database file on
/// first use.
///
/// An in-memory database is shared by the pool's connections and disappears
/// once the last one closes, so those pools never let idle connections expire.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);

    let mut options =
        SqliteConnectOptions::from_str(database_url)?.create_if_missing(true).busy_timeout(BUSY_TIMEOUT);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)));
    if in_memory {
        pool = pool.min_connections(1).idle_timeout(None).max_lifetime(None);
    }

    pool.connect_with(options).await
}

pub fn is_in_memory(database_url: &str) -> bool {
    let location = database_url.trim_start_matches("sqlite:").trim_start_matches("//");
    location.starts_with(":memory:") || location.contains("mode=memory")
}
