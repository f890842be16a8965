//! Read side of the user directory.
//!
//! Accounts are created and authenticated elsewhere; the board core only needs
//! id → username / email lookups. `create` exists for seeding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// Ids bound per `IN (...)` list. Stays well under SQLite's bound-variable limit.
pub const LOOKUP_CHUNK_SIZE: usize = 500;

const FIND_BY_IDS_PREFIX: &str = "SELECT id, username, email, created_at FROM users WHERE id IN (";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: Option<String>,
}

impl User {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"SELECT id, username, email, created_at
               FROM users
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Batch lookup; ids without a row are simply absent from the result.
    ///
    /// Large batches are split into queries of [`LOOKUP_CHUNK_SIZE`] ids.
    pub async fn find_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Self>, sqlx::Error> {
        let mut users = Vec::new();
        for chunk in ids.chunks(LOOKUP_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new(FIND_BY_IDS_PREFIX);
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            users.extend(builder.build_query_as::<User>().fetch_all(pool).await?);
        }
        Ok(users)
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateUser,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"INSERT INTO users (id, username, email)
               VALUES ($1, $2, $3)
               RETURNING id, username, email, created_at"#,
        )
        .bind(id)
        .bind(&data.username)
        .bind(&data.email)
        .fetch_one(pool)
        .await
    }
}
