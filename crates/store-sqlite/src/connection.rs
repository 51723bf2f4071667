// SQLite Connection Pool Setup

use crate::error::map_sqlx_error;
use plainq_core::error::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Creates the SQLite connection pool with WAL mode enabled.
///
/// # Configuration
/// - `PLAINQ_POOL_SIZE`: max connections (default: 20)
/// - `PLAINQ_POOL_TIMEOUT`: busy timeout in seconds (default: 5)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let max_connections: u32 = std::env::var("PLAINQ_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);

    let busy_timeout_secs: u64 = std::env::var("PLAINQ_POOL_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|err| Error::InvalidArgument(format!("invalid storage path: {err}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(busy_timeout_secs))
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(map_sqlx_error)?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_pool_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/test.db", dir.path().display());

        let pool = create_pool(&url).await.unwrap();
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn create_pool_rejects_malformed_url() {
        let err = create_pool("postgres://nope").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
