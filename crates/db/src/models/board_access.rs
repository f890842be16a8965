//! Explicit board grants.
//!
//! A grant maps one non-owner user to an [`AccessLevel`] on one board. At most one
//! row exists per `(board_id, user_id)`; the owner never has one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Graded board permission. Each level includes everything below it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize, TS, EnumString, Display,
)]
#[ts(export)]
#[sqlx(type_name = "access_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AccessLevel {
    Read,
    Write,
    Admin,
}

impl AccessLevel {
    pub const ALL: [AccessLevel; 3] = [AccessLevel::Read, AccessLevel::Write, AccessLevel::Admin];

    /// Position in the READ < WRITE < ADMIN order. Comparisons go through this,
    /// never through the string form.
    pub const fn rank(self) -> u8 {
        match self {
            AccessLevel::Read => 0,
            AccessLevel::Write => 1,
            AccessLevel::Admin => 2,
        }
    }

    /// Whether holding `self` satisfies a requirement of `required`.
    pub const fn satisfies(self, required: AccessLevel) -> bool {
        self.rank() >= required.rank()
    }
}

impl PartialOrd for AccessLevel {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AccessLevel {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BoardAccess {
    pub id: Uuid,
    pub board_id: Uuid,
    pub user_id: Uuid,
    pub access_level: AccessLevel,
    pub granted_by_user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl BoardAccess {
    pub async fn find_for_user<'e, E>(
        executor: E,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, BoardAccess>(
            r#"SELECT id, board_id, user_id, access_level, granted_by_user_id, created_at
               FROM board_access
               WHERE board_id = $1 AND user_id = $2"#,
        )
        .bind(board_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_board(
        pool: &SqlitePool,
        board_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, BoardAccess>(
            r#"SELECT id, board_id, user_id, access_level, granted_by_user_id, created_at
               FROM board_access
               WHERE board_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(board_id)
        .fetch_all(pool)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        board_id: Uuid,
        user_id: Uuid,
        access_level: AccessLevel,
        granted_by_user_id: Uuid,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let id = Uuid::new_v4();
        sqlx::query_as::<_, BoardAccess>(
            r#"INSERT INTO board_access (id, board_id, user_id, access_level, granted_by_user_id)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, board_id, user_id, access_level, granted_by_user_id, created_at"#,
        )
        .bind(id)
        .bind(board_id)
        .bind(user_id)
        .bind(access_level)
        .bind(granted_by_user_id)
        .fetch_one(executor)
        .await
    }

    pub async fn update_level<'e, E>(
        executor: E,
        id: Uuid,
        access_level: AccessLevel,
    ) -> Result<Self, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as::<_, BoardAccess>(
            r#"UPDATE board_access
               SET access_level = $2
               WHERE id = $1
               RETURNING id, board_id, user_id, access_level, granted_by_user_id, created_at"#,
        )
        .bind(id)
        .bind(access_level)
        .fetch_one(executor)
        .await
    }

    pub async fn delete<'e, E>(executor: E, id: Uuid) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM board_access WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_rank_order() {
        assert!(AccessLevel::Read.rank() < AccessLevel::Write.rank());
        assert!(AccessLevel::Write.rank() < AccessLevel::Admin.rank());
        assert!(AccessLevel::Read < AccessLevel::Admin);
    }

    #[test]
    fn test_satisfies_matrix() {
        for held in AccessLevel::ALL {
            for required in AccessLevel::ALL {
                assert_eq!(held.satisfies(required), held.rank() >= required.rank());
            }
        }
        assert!(AccessLevel::Admin.satisfies(AccessLevel::Read));
        assert!(!AccessLevel::Read.satisfies(AccessLevel::Write));
    }

    #[test]
    fn test_order_is_not_alphabetical() {
        // "ADMIN" < "READ" < "WRITE" alphabetically; the rank order must win.
        let mut levels = vec![AccessLevel::Write, AccessLevel::Admin, AccessLevel::Read];
        levels.sort();
        assert_eq!(
            levels,
            vec![AccessLevel::Read, AccessLevel::Write, AccessLevel::Admin]
        );
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(AccessLevel::Write.to_string(), "WRITE");
        assert_eq!(AccessLevel::from_str("admin").unwrap(), AccessLevel::Admin);
        assert_eq!(
            serde_json::to_string(&AccessLevel::Read).unwrap(),
            "\"READ\""
        );
    }
}
