//! Test pools and fixtures.
//!
//! Migrations run once into a template database; each test gets its own copy of
//! that file, which is far quicker than migrating every time.

use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tempfile::TempDir;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::models::{
    board::{Board, CreateBoard},
    user::{CreateUser, User},
};

static TEMPLATE_DIR: OnceLock<TempDir> = OnceLock::new();
static TEMPLATE_READY: OnceCell<()> = OnceCell::const_new();

fn template_dir() -> &'static TempDir {
    TEMPLATE_DIR.get_or_init(|| TempDir::new().expect("Failed to create template temp dir"))
}

async fn ensure_template_ready() {
    TEMPLATE_READY
        .get_or_init(|| async {
            let template_path = template_dir().path().join("template.db");

            let options =
                SqliteConnectOptions::from_str(&format!("sqlite://{}", template_path.display()))
                    .expect("Invalid template database URL")
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Delete);

            let pool = SqlitePoolOptions::new()
                .min_connections(0)
                .max_connections(1)
                .connect_with(options)
                .await
                .expect("Failed to create template pool");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations on template");

            pool.close().await;
        })
        .await;
}

/// A migrated pool backed by a private file. Keep the `TempDir` alive for the
/// duration of the test.
pub async fn create_test_pool() -> (SqlitePool, TempDir) {
    ensure_template_ready().await;

    let temp_dir = TempDir::new().expect("Failed to create test temp dir");
    let db_path = temp_dir.path().join("test.db");
    let template_path = template_dir().path().join("template.db");
    std::fs::copy(&template_path, &db_path).expect("Failed to copy template database");

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .expect("Invalid test database URL")
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .expect("Failed to create test pool");

    (pool, temp_dir)
}

pub async fn create_test_user(pool: &SqlitePool, username: &str) -> User {
    let data = CreateUser {
        username: username.to_string(),
        email: Some(format!("{username}@example.com")),
    };
    User::create(pool, &data, Uuid::new_v4())
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_user_without_email(pool: &SqlitePool, username: &str) -> User {
    let data = CreateUser {
        username: username.to_string(),
        email: None,
    };
    User::create(pool, &data, Uuid::new_v4())
        .await
        .expect("Failed to create test user")
}

pub async fn create_test_board(pool: &SqlitePool, owner_user_id: Uuid, name: &str) -> Board {
    let data = CreateBoard {
        owner_user_id,
        name: name.to_string(),
        description: None,
        is_public: false,
        is_template: false,
    };
    Board::create(pool, &data, Uuid::new_v4())
        .await
        .expect("Failed to create test board")
}
