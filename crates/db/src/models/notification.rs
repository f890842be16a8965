//! In-app notifications.
//!
//! Rows are only created by the notification dispatcher and only mutated by
//! their recipient marking them read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::change_log::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, TS, EnumString, Display)]
#[ts(export)]
#[sqlx(type_name = "notification_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum NotificationType {
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskMoved,
    BoardUpdated,
    StatusCreated,
    StatusUpdated,
    StatusDeleted,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient.
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub message: String,
    pub reference_type: EntityType,
    pub reference_id: Uuid,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub message: String,
    pub reference_type: EntityType,
    pub reference_id: Uuid,
}

impl Notification {
    pub async fn create(pool: &SqlitePool, data: &CreateNotification) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, Notification>(
            r#"INSERT INTO notifications
                   (id, user_id, notification_type, message, reference_type, reference_id)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, user_id, notification_type, message, reference_type, reference_id,
                         is_read, created_at"#,
        )
        .bind(id)
        .bind(data.user_id)
        .bind(data.notification_type)
        .bind(&data.message)
        .bind(data.reference_type)
        .bind(data.reference_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"SELECT id, user_id, notification_type, message, reference_type, reference_id,
                      is_read, created_at
               FROM notifications
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_recent_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"SELECT id, user_id, notification_type, message, reference_type, reference_id,
                      is_read, created_at
               FROM notifications
               WHERE user_id = $1
               ORDER BY created_at DESC, rowid DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn find_unread_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            r#"SELECT id, user_id, notification_type, message, reference_type, reference_id,
                      is_read, created_at
               FROM notifications
               WHERE user_id = $1 AND is_read = 0
               ORDER BY created_at DESC, rowid DESC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_unread(pool: &SqlitePool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn mark_read(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Returns how many rows flipped from unread to read.
    pub async fn mark_all_read_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = $1 AND is_read = 0")
                .bind(user_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
