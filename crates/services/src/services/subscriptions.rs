//! Per-user subscriptions to entity changes.

use std::sync::Arc;

use db::{
    models::{alert_subscription::AlertSubscription, change_log::EntityType},
    validation::ensure_subscribable,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use super::{error::ServiceError, user_directory::UserDirectory};

/// Channel toggles for a subscribe call. `None` keeps the stored value, or
/// defaults to enabled for a new subscription.
#[derive(Debug, Clone, Copy, Default, Deserialize, TS)]
#[ts(export)]
pub struct SubscriptionPreferences {
    pub email_enabled: Option<bool>,
    pub in_app_enabled: Option<bool>,
}

impl SubscriptionPreferences {
    pub fn new(email_enabled: Option<bool>, in_app_enabled: Option<bool>) -> Self {
        Self {
            email_enabled,
            in_app_enabled,
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    pool: SqlitePool,
    users: Arc<dyn UserDirectory>,
}

impl SubscriptionRegistry {
    pub fn new(pool: SqlitePool, users: Arc<dyn UserDirectory>) -> Self {
        Self { pool, users }
    }

    pub async fn subscribe(
        &self,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
        preferences: SubscriptionPreferences,
    ) -> Result<AlertSubscription, ServiceError> {
        ensure_subscribable(entity_type)?;
        if !self.users.exists(user_id).await? {
            return Err(ServiceError::UserNotFound);
        }

        let subscription = AlertSubscription::upsert(
            &self.pool,
            user_id,
            entity_type,
            entity_id,
            preferences.email_enabled,
            preferences.in_app_enabled,
        )
        .await?;

        tracing::info!(
            user_id = %user_id,
            entity_type = %entity_type,
            entity_id = %entity_id,
            email_enabled = subscription.email_enabled,
            in_app_enabled = subscription.in_app_enabled,
            "Subscribed to entity changes"
        );

        Ok(subscription)
    }

    /// Succeeds whether or not a subscription existed.
    pub async fn unsubscribe(
        &self,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<(), ServiceError> {
        let removed = AlertSubscription::delete(&self.pool, user_id, entity_type, entity_id).await?;
        tracing::debug!(
            user_id = %user_id,
            entity_type = %entity_type,
            entity_id = %entity_id,
            removed,
            "Unsubscribed from entity changes"
        );
        Ok(())
    }

    pub async fn is_subscribed(
        &self,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<bool, ServiceError> {
        Ok(AlertSubscription::exists(&self.pool, user_id, entity_type, entity_id).await?)
    }

    pub async fn get(
        &self,
        user_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Option<AlertSubscription>, ServiceError> {
        Ok(AlertSubscription::find(&self.pool, user_id, entity_type, entity_id).await?)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<AlertSubscription>, ServiceError> {
        Ok(AlertSubscription::find_by_user(&self.pool, user_id).await?)
    }

    pub async fn list_for_entity(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<Vec<AlertSubscription>, ServiceError> {
        Ok(AlertSubscription::find_by_entity(&self.pool, entity_type, entity_id).await?)
    }

    /// Drop every subscription to an entity. Called by owning services on delete.
    pub async fn unsubscribe_all(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let removed =
            AlertSubscription::delete_for_entity(&self.pool, entity_type, entity_id).await?;
        if removed > 0 {
            tracing::info!(
                entity_type = %entity_type,
                entity_id = %entity_id,
                removed,
                "Removed subscriptions for entity"
            );
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use db::test_utils::{create_test_pool, create_test_user};

    use super::*;
    use crate::services::{error::ErrorKind, user_directory::DbUserDirectory};

    fn registry(pool: &SqlitePool) -> SubscriptionRegistry {
        SubscriptionRegistry::new(pool.clone(), Arc::new(DbUserDirectory::new(pool.clone())))
    }

    #[tokio::test]
    async fn test_subscribe_defaults_both_channels_on() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let task = Uuid::new_v4();

        let sub = registry(&pool)
            .subscribe(
                alice.id,
                EntityType::Task,
                task,
                SubscriptionPreferences::default(),
            )
            .await
            .unwrap();
        assert!(sub.email_enabled);
        assert!(sub.in_app_enabled);
    }

    #[tokio::test]
    async fn test_comment_and_custom_field_are_not_subscribable() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let subs = registry(&pool);

        for entity_type in [EntityType::Comment, EntityType::CustomField] {
            let err = subs
                .subscribe(
                    alice.id,
                    entity_type,
                    Uuid::new_v4(),
                    SubscriptionPreferences::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        }
        assert!(subs.list_for_user(alice.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_subscribe() {
        let (pool, _temp_dir) = create_test_pool().await;
        let err = registry(&pool)
            .subscribe(
                Uuid::new_v4(),
                EntityType::Board,
                Uuid::new_v4(),
                SubscriptionPreferences::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
    }

    #[tokio::test]
    async fn test_unsubscribe_all_only_touches_one_entity() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let subs = registry(&pool);
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let prefs = SubscriptionPreferences::default();

        for user in [alice.id, bob.id] {
            subs.subscribe(user, EntityType::Task, gone, prefs)
                .await
                .unwrap();
        }
        subs.subscribe(alice.id, EntityType::Task, kept, prefs)
            .await
            .unwrap();

        let removed = subs.unsubscribe_all(EntityType::Task, gone).await.unwrap();
        assert_eq!(removed, 2);
        let left = subs.list_for_entity(EntityType::Task, gone).await.unwrap();
        assert!(left.is_empty());
        let kept_subscribed = subs
            .is_subscribed(alice.id, EntityType::Task, kept)
            .await
            .unwrap();
        assert!(kept_subscribed);
    }
}
