//! Append-only change history.
//!
//! Rows are never updated or deleted, and nothing cascades from the entity they
//! describe: the history of a deleted task stays queryable by its id. Within one
//! entity, entries are ordered by `created_at` with insertion order (`rowid`)
//! breaking ties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize, TS, EnumString, Display,
)]
#[ts(export)]
#[sqlx(type_name = "entity_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum EntityType {
    Task,
    Board,
    Status,
    Comment,
    CustomField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, TS, EnumString, Display)]
#[ts(export)]
#[sqlx(type_name = "change_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Move,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeLog {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    /// `None` for system-initiated changes.
    pub actor_user_id: Option<Uuid>,
    pub action: ChangeAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChangeLog {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub action: ChangeAction,
    pub field_name: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl NewChangeLog {
    /// A CREATE or DELETE entry with no field payload.
    pub fn lifecycle(
        entity_type: EntityType,
        entity_id: Uuid,
        actor_user_id: Option<Uuid>,
        action: ChangeAction,
    ) -> Self {
        Self {
            entity_type,
            entity_id,
            actor_user_id,
            action,
            field_name: None,
            old_value: None,
            new_value: None,
        }
    }
}

impl ChangeLog {
    pub async fn append<'e, E>(executor: E, entry: &NewChangeLog) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, ChangeLog>(
            r#"INSERT INTO change_logs
                   (id, entity_type, entity_id, actor_user_id, action, field_name, old_value, new_value)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING id, entity_type, entity_id, actor_user_id, action, field_name,
                         old_value, new_value, created_at"#,
        )
        .bind(id)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.actor_user_id)
        .bind(entry.action)
        .bind(&entry.field_name)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .fetch_one(executor)
        .await
    }

    /// Newest first.
    pub async fn find_recent_for_entity(
        pool: &SqlitePool,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChangeLog>(
            r#"SELECT id, entity_type, entity_id, actor_user_id, action, field_name,
                      old_value, new_value, created_at
               FROM change_logs
               WHERE entity_type = $1 AND entity_id = $2
               ORDER BY created_at DESC, rowid DESC
               LIMIT $3"#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Newest first.
    pub async fn find_recent_by_actor(
        pool: &SqlitePool,
        actor_user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, ChangeLog>(
            r#"SELECT id, entity_type, entity_id, actor_user_id, action, field_name,
                      old_value, new_value, created_at
               FROM change_logs
               WHERE actor_user_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT $2"#,
        )
        .bind(actor_user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_entity(
        pool: &SqlitePool,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM change_logs WHERE entity_type = $1 AND entity_id = $2",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(pool)
        .await
    }
}
