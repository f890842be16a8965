//! Board rows as seen by the access-control core.
//!
//! Board CRUD belongs to the board service. The core reads boards to find their
//! owner and to list what a user can reach.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Board {
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBoard {
    pub owner_user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_template: bool,
}

impl Board {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.owner_user_id == user_id
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, Board>(
            r#"SELECT id, owner_user_id, name, description, is_public, is_template, created_at, updated_at
               FROM boards
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_owned_by(
        pool: &SqlitePool,
        owner_user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"SELECT id, owner_user_id, name, description, is_public, is_template, created_at, updated_at
               FROM boards
               WHERE owner_user_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(owner_user_id)
        .fetch_all(pool)
        .await
    }

    /// Boards the user reaches through an explicit grant.
    pub async fn find_shared_with(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"SELECT b.id, b.owner_user_id, b.name, b.description, b.is_public, b.is_template,
                      b.created_at, b.updated_at
               FROM boards b
               INNER JOIN board_access ba ON ba.board_id = b.id
               WHERE ba.user_id = $1
               ORDER BY ba.created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        data: &CreateBoard,
        id: Uuid,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Board>(
            r#"INSERT INTO boards (id, owner_user_id, name, description, is_public, is_template)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, owner_user_id, name, description, is_public, is_template, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.owner_user_id)
        .bind(&data.name)
        .bind(&data.description)
        .bind(data.is_public)
        .bind(data.is_template)
        .fetch_one(pool)
        .await
    }
}
