//! Username and email lookups.
//!
//! The user directory is owned by another service. Lookups never fail for a
//! missing user; callers decide whether absence is an error.

use std::collections::HashMap;

use async_trait::async_trait;
use db::models::user::User;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Display name used when the directory has no row for an id.
pub const UNKNOWN_USERNAME: &str = "Unknown";

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn username(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error>;

    /// Batch lookup; unknown ids are absent from the map.
    async fn usernames(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, String>, sqlx::Error>;

    async fn email(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error>;

    async fn exists(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(self.username(user_id).await?.is_some())
    }
}

/// Directory backed by the local `users` table.
#[derive(Clone)]
pub struct DbUserDirectory {
    pool: SqlitePool,
}

impl DbUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn username(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
        Ok(User::find_by_id(&self.pool, user_id)
            .await?
            .map(|u| u.username))
    }

    async fn usernames(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, String>, sqlx::Error> {
        let mut ids = user_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        Ok(User::find_by_ids(&self.pool, &ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect())
    }

    async fn email(&self, user_id: Uuid) -> Result<Option<String>, sqlx::Error> {
        Ok(User::find_by_id(&self.pool, user_id)
            .await?
            .and_then(|u| u.email)
            .filter(|e| !e.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use db::test_utils::{create_test_pool, create_test_user, create_test_user_without_email};

    use super::*;

    #[tokio::test]
    async fn test_lookups() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user_without_email(&pool, "bob").await;
        let directory = DbUserDirectory::new(pool);

        assert_eq!(
            directory.username(alice.id).await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(
            directory.email(alice.id).await.unwrap().as_deref(),
            Some("alice@example.com")
        );
        assert!(directory.email(bob.id).await.unwrap().is_none());
        assert!(directory.exists(bob.id).await.unwrap());
        assert!(!directory.exists(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_usernames_tolerates_duplicates_and_unknown_ids() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let directory = DbUserDirectory::new(pool);

        let names = directory
            .usernames(&[alice.id, alice.id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.get(&alice.id).map(String::as_str), Some("alice"));
    }
}
