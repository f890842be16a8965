use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::change_log::EntityType;

/// A user's opt-in to changes on one entity, with per-channel toggles.
///
/// No row means not subscribed. Board owners are not implicitly subscribed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AlertSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub email_enabled: bool,
    pub in_app_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AlertSubscription {
    /// Insert or partially update the subscription for `(user, entity)`.
    ///
    /// `None` preferences keep the stored value on update and default to `true`
    /// on insert.
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
        email_enabled: Option<bool>,
        in_app_enabled: Option<bool>,
    ) -> Result<Self, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, AlertSubscription>(
            r#"INSERT INTO alert_subscriptions
                   (id, user_id, entity_type, entity_id, email_enabled, in_app_enabled)
               VALUES ($1, $2, $3, $4, COALESCE($5, 1), COALESCE($6, 1))
               ON CONFLICT(user_id, entity_type, entity_id) DO UPDATE SET
                   email_enabled = COALESCE($5, alert_subscriptions.email_enabled),
                   in_app_enabled = COALESCE($6, alert_subscriptions.in_app_enabled)
               RETURNING id, user_id, entity_type, entity_id, email_enabled, in_app_enabled, created_at"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(entity_type)
        .bind(entity_id)
        .bind(email_enabled)
        .bind(in_app_enabled)
        .fetch_one(pool)
        .await
    }

    pub async fn find(
        pool: &SqlitePool,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertSubscription>(
            r#"SELECT id, user_id, entity_type, entity_id, email_enabled, in_app_enabled, created_at
               FROM alert_subscriptions
               WHERE user_id = $1 AND entity_type = $2 AND entity_id = $3"#,
        )
        .bind(user_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn exists(
        pool: &SqlitePool,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(
                   SELECT 1 FROM alert_subscriptions
                   WHERE user_id = $1 AND entity_type = $2 AND entity_id = $3
               )"#,
        )
        .bind(user_id)
        .bind(entity_type)
        .bind(entity_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertSubscription>(
            r#"SELECT id, user_id, entity_type, entity_id, email_enabled, in_app_enabled, created_at
               FROM alert_subscriptions
               WHERE user_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Subscribers of one entity, oldest subscription first.
    pub async fn find_by_entity(
        pool: &SqlitePool,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AlertSubscription>(
            r#"SELECT id, user_id, entity_type, entity_id, email_enabled, in_app_enabled, created_at
               FROM alert_subscriptions
               WHERE entity_type = $1 AND entity_id = $2
               ORDER BY created_at ASC, rowid ASC"#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(
        pool: &SqlitePool,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM alert_subscriptions WHERE user_id = $1 AND entity_type = $2 AND entity_id = $3",
        )
        .bind(user_id)
        .bind(entity_type)
        .bind(entity_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_entity(
        pool: &SqlitePool,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM alert_subscriptions WHERE entity_type = $1 AND entity_id = $2")
                .bind(entity_type)
                .bind(entity_id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }
}
