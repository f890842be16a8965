use std::{path::Path, str::FromStr, time::Duration};

use sqlx::{
    Error, Executor, Pool, Sqlite,
    sqlite::{
        SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
        SqliteSynchronous,
    },
};
use tracing::info;
use utils::assets::database_path;

pub mod models;
pub mod retry;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod validation;

pub use retry::{RetryConfig, is_retryable_error, with_retry};

// ============================================================================
// Connection Pool Configuration
// ============================================================================

/// SQLite has a single writer; a small pool is enough.
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

const DEFAULT_MIN_CONNECTIONS: u32 = 1;

const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Idle connection timeout in seconds (10 minutes).
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

fn get_max_connections() -> u32 {
    std::env::var("BOARD_SQLITE_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|&n| n > 0 && n <= 100)
        .unwrap_or(DEFAULT_MAX_CONNECTIONS)
}

/// Pragmas applied to every new connection.
///
/// `synchronous` must come after `mmap_size`; with mmap enabled first, SQLite can
/// otherwise skip fsyncs and surface SQLITE_IOERR under write load.
async fn apply_performance_pragmas(conn: &mut SqliteConnection) -> Result<(), Error> {
    conn.execute("PRAGMA temp_store = 2").await?;
    conn.execute("PRAGMA mmap_size = 67108864").await?; // 64MB
    conn.execute("PRAGMA synchronous = NORMAL").await?;
    conn.execute("PRAGMA cache_size = -16000").await?;
    Ok(())
}

#[derive(Clone)]
pub struct DBService {
    pub pool: Pool<Sqlite>,
}

impl DBService {
    /// Open the database at [`database_path`] and apply pending migrations.
    pub async fn new() -> Result<DBService, Error> {
        Self::open(&database_path()).await
    }

    pub async fn open(db_path: &Path) -> Result<DBService, Error> {
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());
        let max_connections = get_max_connections();

        info!(
            path = %db_path.display(),
            max_connections,
            "Initializing SQLite connection pool"
        );

        let options = SqliteConnectOptions::from_str(&database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(DEFAULT_MIN_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)))
            .after_connect(|conn, _meta| {
                Box::pin(async move { apply_performance_pragmas(conn).await })
            })
            .connect_with(options)
            .await?;

        run_migrations(&pool).await?;

        Ok(DBService { pool })
    }
}

pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = DBService::open(&dir.path().join("board.sqlite"))
            .await
            .unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(&service.pool)
        .await
        .unwrap();

        assert_eq!(
            tables,
            vec![
                "alert_subscriptions",
                "board_access",
                "boards",
                "change_logs",
                "notifications",
                "users",
            ]
        );
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("board.sqlite");
        let first = DBService::open(&path).await.unwrap();
        first.pool.close().await;
        let second = DBService::open(&path).await.unwrap();
        let journal: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(&second.pool)
            .await
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }
}
