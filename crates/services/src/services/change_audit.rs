//! Append-only audit trail of entity changes.
//!
//! Field updates are diff-suppressed: recording a change whose old and new values
//! are equal (or both absent) writes nothing. Creates, deletes and moves always
//! append.

use std::sync::Arc;

use db::{
    RetryConfig,
    models::change_log::{ChangeAction, ChangeLog, EntityType, NewChangeLog},
    with_retry,
};
use serde::Serialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use super::{
    error::ServiceError,
    user_directory::{UNKNOWN_USERNAME, UserDirectory},
};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Display name for entries with no actor.
pub const SYSTEM_ACTOR: &str = "System";

/// Field name carried by MOVE entries.
pub const MOVE_FIELD: &str = "location";

/// Whether recording `old -> new` would add information to the log.
///
/// # Examples
/// ```
/// use services::services::change_audit::is_meaningful_change;
///
/// assert!(!is_meaningful_change(None, None));
/// assert!(!is_meaningful_change(Some("A"), Some("A")));
/// assert!(is_meaningful_change(Some("A"), Some("B")));
/// assert!(is_meaningful_change(None, Some("")));
/// ```
pub fn is_meaningful_change(old: Option<&str>, new: Option<&str>) -> bool {
    old != new
}

/// Build an UPDATE entry, or `None` when the change is not meaningful.
pub fn field_change_entry(
    entity_type: EntityType,
    entity_id: Uuid,
    actor_user_id: Option<Uuid>,
    field_name: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
) -> Option<NewChangeLog> {
    if !is_meaningful_change(old_value, new_value) {
        return None;
    }

    Some(NewChangeLog {
        entity_type,
        entity_id,
        actor_user_id,
        action: ChangeAction::Update,
        field_name: Some(field_name.to_string()),
        old_value: old_value.map(str::to_string),
        new_value: new_value.map(str::to_string),
    })
}

pub fn move_entry(
    entity_type: EntityType,
    entity_id: Uuid,
    actor_user_id: Option<Uuid>,
    from_location: &str,
    to_location: &str,
) -> NewChangeLog {
    NewChangeLog {
        entity_type,
        entity_id,
        actor_user_id,
        action: ChangeAction::Move,
        field_name: Some(MOVE_FIELD.to_string()),
        old_value: Some(from_location.to_string()),
        new_value: Some(to_location.to_string()),
    }
}

/// A change log entry with its actor's display name.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ChangeLogWithUser {
    #[serde(flatten)]
    #[ts(flatten)]
    pub entry: ChangeLog,
    pub actor_username: String,
}

#[derive(Clone)]
pub struct ChangeAuditLog {
    pool: SqlitePool,
    users: Arc<dyn UserDirectory>,
    retry: RetryConfig,
    history_limit: i64,
}

impl ChangeAuditLog {
    pub fn new(pool: SqlitePool, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            pool,
            users,
            retry: RetryConfig::default(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn with_history_limit(mut self, limit: i64) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn record_create(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        actor_user_id: Option<Uuid>,
    ) -> Result<ChangeLog, ServiceError> {
        self.append(NewChangeLog::lifecycle(
            entity_type,
            entity_id,
            actor_user_id,
            ChangeAction::Create,
        ))
        .await
    }

    pub async fn record_delete(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        actor_user_id: Option<Uuid>,
    ) -> Result<ChangeLog, ServiceError> {
        self.append(NewChangeLog::lifecycle(
            entity_type,
            entity_id,
            actor_user_id,
            ChangeAction::Delete,
        ))
        .await
    }

    /// Returns `None` without touching storage when nothing changed.
    pub async fn record_field_change(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        actor_user_id: Option<Uuid>,
        field_name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
    ) -> Result<Option<ChangeLog>, ServiceError> {
        match field_change_entry(
            entity_type,
            entity_id,
            actor_user_id,
            field_name,
            old_value,
            new_value,
        ) {
            Some(entry) => self.append(entry).await.map(Some),
            None => {
                tracing::trace!(
                    entity_type = %entity_type,
                    entity_id = %entity_id,
                    field_name,
                    "Unchanged field, skipping change log entry"
                );
                Ok(None)
            }
        }
    }

    /// Always appends, even when `from_location == to_location`.
    pub async fn record_move(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        actor_user_id: Option<Uuid>,
        from_location: &str,
        to_location: &str,
    ) -> Result<ChangeLog, ServiceError> {
        self.append(move_entry(
            entity_type,
            entity_id,
            actor_user_id,
            from_location,
            to_location,
        ))
        .await
    }

    /// Append inside a caller-owned transaction. Not retried.
    pub async fn append_with<'e, E>(
        executor: E,
        entry: &NewChangeLog,
    ) -> Result<ChangeLog, ServiceError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let stored = ChangeLog::append(executor, entry).await?;
        log_appended(&stored);
        Ok(stored)
    }

    async fn append(&self, entry: NewChangeLog) -> Result<ChangeLog, ServiceError> {
        let pool = self.pool.clone();
        let entry = Arc::new(entry);

        let stored = with_retry(&self.retry, "append_change_log", || {
            let pool = pool.clone();
            let entry = Arc::clone(&entry);
            async move { ChangeLog::append(&pool, &entry).await }
        })
        .await
        .inspect_err(|e| {
            tracing::error!(
                entity_type = %entry.entity_type,
                entity_id = %entry.entity_id,
                action = %entry.action,
                error = %e,
                "Failed to append change log entry"
            );
        })?;

        log_appended(&stored);
        Ok(stored)
    }

    /// Most recent entries for one entity, newest first.
    pub async fn history(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        let entries = ChangeLog::find_recent_for_entity(
            &self.pool,
            entity_type,
            entity_id,
            self.history_limit,
        )
        .await?;
        self.with_usernames(entries).await
    }

    pub async fn task_history(
        &self,
        task_id: Uuid,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        self.history(EntityType::Task, task_id).await
    }

    pub async fn board_history(
        &self,
        board_id: Uuid,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        self.history(EntityType::Board, board_id).await
    }

    /// Most recent entries written by `actor_user_id`, newest first.
    pub async fn user_activity(
        &self,
        actor_user_id: Uuid,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        let entries =
            ChangeLog::find_recent_by_actor(&self.pool, actor_user_id, self.history_limit).await?;
        self.with_usernames(entries).await
    }

    async fn with_usernames(
        &self,
        entries: Vec<ChangeLog>,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        let actor_ids: Vec<Uuid> = entries.iter().filter_map(|e| e.actor_user_id).collect();
        let names = self.users.usernames(&actor_ids).await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let actor_username = match entry.actor_user_id {
                    None => SYSTEM_ACTOR.to_string(),
                    Some(id) => names
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()),
                };
                ChangeLogWithUser {
                    entry,
                    actor_username,
                }
            })
            .collect())
    }
}

fn log_appended(entry: &ChangeLog) {
    tracing::debug!(
        change_log_id = %entry.id,
        entity_type = %entry.entity_type,
        entity_id = %entry.entity_id,
        action = %entry.action,
        field_name = entry.field_name.as_deref().unwrap_or(""),
        "Appended change log entry"
    );
}
