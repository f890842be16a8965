//! Integration tests for board grants and the queries the access resolver relies on.

use std::str::FromStr;

use db::models::{
    board::{Board, CreateBoard},
    board_access::{AccessLevel, BoardAccess},
    user::{CreateUser, User},
};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use tempfile::TempDir;
use uuid::Uuid;

async fn setup_test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.db");

    let options =
        SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.to_string_lossy()))
            .expect("Invalid database URL")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to create pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

async fn create_user(pool: &SqlitePool, username: &str) -> User {
    let data = CreateUser {
        username: username.to_string(),
        email: None,
    };
    User::create(pool, &data, Uuid::new_v4())
        .await
        .expect("Failed to create user")
}

async fn create_board(pool: &SqlitePool, owner: Uuid, name: &str) -> Board {
    let data = CreateBoard {
        owner_user_id: owner,
        name: name.to_string(),
        description: Some("test board".to_string()),
        is_public: false,
        is_template: false,
    };
    Board::create(pool, &data, Uuid::new_v4())
        .await
        .expect("Failed to create board")
}

#[tokio::test]
async fn test_duplicate_grant_violates_unique_constraint() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "owner").await;
    let guest = create_user(&pool, "guest").await;
    let board = create_board(&pool, owner.id, "Roadmap").await;

    BoardAccess::create(&pool, board.id, guest.id, AccessLevel::Read, owner.id)
        .await
        .expect("First grant should succeed");

    let err = BoardAccess::create(&pool, board.id, guest.id, AccessLevel::Admin, owner.id)
        .await
        .expect_err("Second grant for the same pair must fail");

    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("Expected unique violation, got {other:?}"),
    }

    let grants = BoardAccess::find_by_board(&pool, board.id).await.unwrap();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].access_level, AccessLevel::Read);
}

#[tokio::test]
async fn test_access_level_round_trips_as_uppercase_text() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "owner").await;
    let guest = create_user(&pool, "guest").await;
    let board = create_board(&pool, owner.id, "Roadmap").await;

    BoardAccess::create(&pool, board.id, guest.id, AccessLevel::Write, owner.id)
        .await
        .unwrap();

    let stored: String = sqlx::query_scalar("SELECT access_level FROM board_access")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, "WRITE");

    let grant = BoardAccess::find_for_user(&pool, board.id, guest.id)
        .await
        .unwrap()
        .expect("grant should exist");
    assert_eq!(grant.access_level, AccessLevel::Write);
    assert_eq!(grant.granted_by_user_id, owner.id);
}

#[tokio::test]
async fn test_update_level_and_delete() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "owner").await;
    let guest = create_user(&pool, "guest").await;
    let board = create_board(&pool, owner.id, "Roadmap").await;

    let grant = BoardAccess::create(&pool, board.id, guest.id, AccessLevel::Read, owner.id)
        .await
        .unwrap();

    let updated = BoardAccess::update_level(&pool, grant.id, AccessLevel::Admin)
        .await
        .unwrap();
    assert_eq!(updated.id, grant.id);
    assert_eq!(updated.access_level, AccessLevel::Admin);

    assert_eq!(BoardAccess::delete(&pool, grant.id).await.unwrap(), 1);
    assert_eq!(BoardAccess::delete(&pool, grant.id).await.unwrap(), 0);
    let remaining = BoardAccess::find_for_user(&pool, board.id, guest.id)
        .await
        .unwrap();
    assert!(remaining.is_none());
}

#[tokio::test]
async fn test_find_shared_with_only_returns_granted_boards() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "owner").await;
    let guest = create_user(&pool, "guest").await;
    let shared = create_board(&pool, owner.id, "Shared").await;
    let _private = create_board(&pool, owner.id, "Private").await;
    let own = create_board(&pool, guest.id, "Guest's own").await;

    BoardAccess::create(&pool, shared.id, guest.id, AccessLevel::Read, owner.id)
        .await
        .unwrap();

    let shared_boards = Board::find_shared_with(&pool, guest.id).await.unwrap();
    assert_eq!(shared_boards.len(), 1);
    assert_eq!(shared_boards[0].id, shared.id);

    let owned = Board::find_owned_by(&pool, guest.id).await.unwrap();
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, own.id);
    assert!(owned[0].is_owned_by(guest.id));
}

#[tokio::test]
async fn test_find_users_by_ids_skips_unknown_ids() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    let found = User::find_by_ids(&pool, &[alice.id, Uuid::new_v4(), bob.id])
        .await
        .unwrap();
    let mut names: Vec<_> = found.into_iter().map(|u| u.username).collect();
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);

    assert!(User::find_by_ids(&pool, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_find_users_by_ids_splits_large_batches() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    // More ids than SQLite accepts as bound variables in one statement.
    let mut ids: Vec<Uuid> = (0..40_000).map(|_| Uuid::new_v4()).collect();
    ids.insert(0, alice.id);
    ids.push(bob.id);

    let found = User::find_by_ids(&pool, &ids).await.unwrap();
    let mut names: Vec<_> = found.into_iter().map(|u| u.username).collect();
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);
}
