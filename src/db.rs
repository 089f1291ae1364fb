//! SQLite connection management.
//!
//! The whole store lives in a single database file. Connections are pooled
//! (SQLite serialises writes regardless, so the pool is effectively one
//! writer plus readers), run in WAL mode, and enforce foreign keys.
//! Transactions roll back on drop, so an early `?` return never leaves a
//! half-applied mutation.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::migrate;

/// Open the pool without touching the schema. Most callers want [`open`].
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = config.db_path();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(Error::from)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(250))
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open the database and bring the schema up to date.
pub async fn open(config: &Config) -> Result<SqlitePool> {
    let pool = connect(config).await?;
    migrate::run_migrations(&pool).await?;
    Ok(pool)
}

/// Backoff schedule for `SQLITE_BUSY` retries.
const BUSY_DELAYS_MS: [u64; 3] = [50, 200, 500];

/// Retry a write operation when the database is locked by another connection.
///
/// Retries up to three times (50ms, 200ms, 500ms); any other error returns
/// immediately.
pub async fn with_busy_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if is_locked(&e) && attempt < BUSY_DELAYS_MS.len() => {
                tokio::time::sleep(Duration::from_millis(BUSY_DELAYS_MS[attempt])).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_locked(e: &Error) -> bool {
    match e {
        Error::Storage(msg) => msg.contains("database is locked") || msg.contains("database table is locked"),
        _ => false,
    }
}

/// Unix seconds now. All timestamps in the store use this clock.
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_retry_gives_up_after_schedule() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_busy_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Storage("database is locked".into())) }
        })
        .await;
        assert!(result.is_err());
        // initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_retry_passes_through_other_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<()> = with_busy_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::input("bad")) }
        })
        .await;
        assert!(matches!(result, Err(Error::Input(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_contention() {
        let calls = AtomicUsize::new(0);
        let result = with_busy_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::Storage("database is locked".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }
}
