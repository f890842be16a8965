//! Management of explicit board grants.
//!
//! Every mutation re-checks that the requester owns the board or holds ADMIN on
//! it, then writes the grant change and its BOARD audit entry in one transaction.

use std::{collections::HashMap, fmt, sync::Arc};

use db::models::{
    board::Board,
    board_access::{AccessLevel, BoardAccess},
    change_log::{ChangeAction, EntityType, NewChangeLog},
};
use serde::Serialize;
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    access::AccessResolver,
    change_audit::ChangeAuditLog,
    error::{ServiceError, is_unique_violation},
    user_directory::{UNKNOWN_USERNAME, UserDirectory},
};

/// Field name of the audit entries written for grant changes.
pub const ACCESS_FIELD: &str = "access";

/// A grant with display names for the grantee and the granter.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct BoardAccessWithUsers {
    #[serde(flatten)]
    #[ts(flatten)]
    pub access: BoardAccess,
    pub username: String,
    pub granted_by_username: String,
}

/// What a user holds on a board, for read paths that need a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveAccess {
    Owner,
    Granted(AccessLevel),
}

impl EffectiveAccess {
    pub fn label(&self) -> String {
        match self {
            EffectiveAccess::Owner => "OWNER".to_string(),
            EffectiveAccess::Granted(level) => level.to_string(),
        }
    }
}

impl fmt::Display for EffectiveAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[derive(Clone)]
pub struct AccessGrantManager {
    pool: SqlitePool,
    resolver: AccessResolver,
    users: Arc<dyn UserDirectory>,
}

impl AccessGrantManager {
    pub fn new(pool: SqlitePool, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            resolver: AccessResolver::new(pool.clone()),
            pool,
            users,
        }
    }

    async fn load_board(&self, board_id: Uuid) -> Result<Board, ServiceError> {
        Board::find_by_id(&self.pool, board_id)
            .await?
            .ok_or(ServiceError::BoardNotFound)
    }

    async fn ensure_admin(
        &self,
        board: &Board,
        requester_id: Uuid,
        action: &str,
    ) -> Result<(), ServiceError> {
        if self
            .resolver
            .authorize(board, requester_id, AccessLevel::Admin)
            .await?
        {
            return Ok(());
        }

        tracing::warn!(
            board_id = %board.id,
            requester_id = %requester_id,
            action,
            "Rejected board access change from non-admin"
        );
        Err(ServiceError::unauthorized(format!(
            "Only the board owner or users with ADMIN access can {action}"
        )))
    }

    async fn display_name(&self, user_id: Uuid) -> Result<String, ServiceError> {
        Ok(self
            .users
            .username(user_id)
            .await?
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string()))
    }

    pub async fn grant(
        &self,
        board_id: Uuid,
        target_user_id: Uuid,
        level: AccessLevel,
        requester_id: Uuid,
    ) -> Result<BoardAccessWithUsers, ServiceError> {
        let board = self.load_board(board_id).await?;
        let target_username = self
            .users
            .username(target_user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        self.ensure_admin(&board, requester_id, "grant access")
            .await?;

        if board.is_owned_by(target_user_id) {
            return Err(ServiceError::OwnerAccessImmutable);
        }
        if BoardAccess::find_for_user(&self.pool, board_id, target_user_id)
            .await?
            .is_some()
        {
            return Err(ServiceError::GrantExists);
        }

        let mut tx = self.pool.begin().await?;
        let access = BoardAccess::create(&mut *tx, board_id, target_user_id, level, requester_id)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::GrantExists
                } else {
                    ServiceError::Database(e)
                }
            })?;
        ChangeAuditLog::append_with(
            &mut *tx,
            &access_entry(
                board_id,
                requester_id,
                "granted",
                &format!("{level} to {target_username}"),
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            board_id = %board_id,
            user_id = %target_user_id,
            access_level = %level,
            granted_by = %requester_id,
            "Granted board access"
        );

        self.with_usernames(access).await
    }

    pub async fn update(
        &self,
        board_id: Uuid,
        target_user_id: Uuid,
        new_level: AccessLevel,
        requester_id: Uuid,
    ) -> Result<BoardAccessWithUsers, ServiceError> {
        let board = self.load_board(board_id).await?;
        self.ensure_admin(&board, requester_id, "update access levels")
            .await?;
        if board.is_owned_by(target_user_id) {
            return Err(ServiceError::OwnerAccessImmutable);
        }

        let existing = BoardAccess::find_for_user(&self.pool, board_id, target_user_id)
            .await?
            .ok_or(ServiceError::GrantNotFound)?;
        let target_username = self.display_name(target_user_id).await?;
        let old_level = existing.access_level;

        let mut tx = self.pool.begin().await?;
        let access = BoardAccess::update_level(&mut *tx, existing.id, new_level).await?;
        ChangeAuditLog::append_with(
            &mut *tx,
            &access_entry(
                board_id,
                requester_id,
                &old_level.to_string(),
                &format!("{new_level} for {target_username}"),
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            board_id = %board_id,
            user_id = %target_user_id,
            old_level = %old_level,
            new_level = %new_level,
            "Updated board access level"
        );

        self.with_usernames(access).await
    }

    pub async fn revoke(
        &self,
        board_id: Uuid,
        target_user_id: Uuid,
        requester_id: Uuid,
    ) -> Result<(), ServiceError> {
        let board = self.load_board(board_id).await?;
        self.ensure_admin(&board, requester_id, "revoke access")
            .await?;
        if board.is_owned_by(target_user_id) {
            return Err(ServiceError::OwnerAccessImmutable);
        }

        let existing = BoardAccess::find_for_user(&self.pool, board_id, target_user_id)
            .await?
            .ok_or(ServiceError::GrantNotFound)?;
        let target_username = self.display_name(target_user_id).await?;

        let mut tx = self.pool.begin().await?;
        if BoardAccess::delete(&mut *tx, existing.id).await? == 0 {
            // Revoked concurrently between the lookup and the delete.
            return Err(ServiceError::GrantNotFound);
        }
        ChangeAuditLog::append_with(
            &mut *tx,
            &access_entry(
                board_id,
                requester_id,
                &format!("{} from {target_username}", existing.access_level),
                "revoked",
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            board_id = %board_id,
            user_id = %target_user_id,
            revoked_by = %requester_id,
            "Revoked board access"
        );

        Ok(())
    }

    /// All grants on the board. Requires owner or ADMIN, not just READ.
    pub async fn list_accesses(
        &self,
        board_id: Uuid,
        requester_id: Uuid,
    ) -> Result<Vec<BoardAccessWithUsers>, ServiceError> {
        let board = self.load_board(board_id).await?;
        self.ensure_admin(&board, requester_id, "view the access list")
            .await?;

        let grants = BoardAccess::find_by_board(&self.pool, board_id).await?;
        let ids: Vec<Uuid> = grants
            .iter()
            .flat_map(|g| [g.user_id, g.granted_by_user_id])
            .collect();
        let names = self.users.usernames(&ids).await?;

        Ok(grants
            .into_iter()
            .map(|access| enrich(access, &names))
            .collect())
    }

    /// What `user_id` holds on the board. Needs no authority of its own.
    ///
    /// A board that does not exist grants nothing, so it reads as `None`.
    pub async fn effective_level(
        &self,
        board_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<EffectiveAccess>, ServiceError> {
        let Some(board) = Board::find_by_id(&self.pool, board_id).await? else {
            return Ok(None);
        };
        if board.is_owned_by(user_id) {
            return Ok(Some(EffectiveAccess::Owner));
        }

        Ok(BoardAccess::find_for_user(&self.pool, board_id, user_id)
            .await?
            .map(|g| EffectiveAccess::Granted(g.access_level)))
    }

    async fn with_usernames(
        &self,
        access: BoardAccess,
    ) -> Result<BoardAccessWithUsers, ServiceError> {
        let names = self
            .users
            .usernames(&[access.user_id, access.granted_by_user_id])
            .await?;
        Ok(enrich(access, &names))
    }
}

fn enrich(access: BoardAccess, names: &HashMap<Uuid, String>) -> BoardAccessWithUsers {
    let lookup = |id: Uuid| {
        names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_USERNAME.to_string())
    };
    BoardAccessWithUsers {
        username: lookup(access.user_id),
        granted_by_username: lookup(access.granted_by_user_id),
        access,
    }
}

fn access_entry(board_id: Uuid, actor_id: Uuid, old_value: &str, new_value: &str) -> NewChangeLog {
    NewChangeLog {
        entity_type: EntityType::Board,
        entity_id: board_id,
        actor_user_id: Some(actor_id),
        action: ChangeAction::Update,
        field_name: Some(ACCESS_FIELD.to_string()),
        old_value: Some(old_value.to_string()),
        new_value: Some(new_value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use db::{
        models::change_log::ChangeLog,
        test_utils::{create_test_board, create_test_pool, create_test_user},
    };

    use super::*;
    use crate::services::{error::ErrorKind, user_directory::DbUserDirectory};

    fn manager(pool: &SqlitePool) -> AccessGrantManager {
        AccessGrantManager::new(pool.clone(), Arc::new(DbUserDirectory::new(pool.clone())))
    }

    #[tokio::test]
    async fn test_grant_writes_grant_and_audit_entry() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let bob = create_test_user(&pool, "bob").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;

        let granted = manager(&pool)
            .grant(board.id, bob.id, AccessLevel::Write, owner.id)
            .await
            .unwrap();
        assert_eq!(granted.username, "bob");
        assert_eq!(granted.granted_by_username, "owner");
        assert_eq!(granted.access.access_level, AccessLevel::Write);

        let log = ChangeLog::find_recent_for_entity(&pool, EntityType::Board, board.id, 50)
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].field_name.as_deref(), Some(ACCESS_FIELD));
        assert_eq!(log[0].old_value.as_deref(), Some("granted"));
        assert_eq!(log[0].new_value.as_deref(), Some("WRITE to bob"));
        assert_eq!(log[0].actor_user_id, Some(owner.id));
    }

    #[tokio::test]
    async fn test_grant_to_unknown_user_fails() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;

        let err = manager(&pool)
            .grant(board.id, Uuid::new_v4(), AccessLevel::Read, owner.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_and_revoke_require_existing_grant() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let bob = create_test_user(&pool, "bob").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let grants = manager(&pool);

        let err = grants
            .update(board.id, bob.id, AccessLevel::Admin, owner.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::GrantNotFound));

        let err = grants.revoke(board.id, bob.id, owner.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::GrantNotFound));
    }

    #[tokio::test]
    async fn test_update_records_old_and_new_level() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let bob = create_test_user(&pool, "bob").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let grants = manager(&pool);

        grants
            .grant(board.id, bob.id, AccessLevel::Read, owner.id)
            .await
            .unwrap();
        let updated = grants
            .update(board.id, bob.id, AccessLevel::Admin, owner.id)
            .await
            .unwrap();
        assert_eq!(updated.access.access_level, AccessLevel::Admin);

        let log = ChangeLog::find_recent_for_entity(&pool, EntityType::Board, board.id, 50)
            .await
            .unwrap();
        assert_eq!(log[0].old_value.as_deref(), Some("READ"));
        assert_eq!(log[0].new_value.as_deref(), Some("ADMIN for bob"));
    }

    #[tokio::test]
    async fn test_effective_level_labels() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let bob = create_test_user(&pool, "bob").await;
        let carol = create_test_user(&pool, "carol").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let grants = manager(&pool);
        grants
            .grant(board.id, bob.id, AccessLevel::Write, owner.id)
            .await
            .unwrap();

        let owner_level = grants.effective_level(board.id, owner.id).await.unwrap();
        assert_eq!(owner_level, Some(EffectiveAccess::Owner));
        assert_eq!(owner_level.unwrap().label(), "OWNER");

        let bob_level = grants.effective_level(board.id, bob.id).await.unwrap();
        assert_eq!(bob_level.map(|l| l.label()).as_deref(), Some("WRITE"));

        let carol_level = grants.effective_level(board.id, carol.id).await.unwrap();
        assert!(carol_level.is_none());
    }

    #[tokio::test]
    async fn test_effective_level_on_missing_board_is_none() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let grants = manager(&pool);

        let level = grants
            .effective_level(Uuid::new_v4(), owner.id)
            .await
            .unwrap();
        assert!(level.is_none());
    }
}
