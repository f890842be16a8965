//! Board authorization.
//!
//! A board's owner passes every check without a grant row. Everyone else needs a
//! [`BoardAccess`] grant whose level satisfies the requirement. Decisions are
//! never cached; every call reads current state.

use db::models::{
    board::Board,
    board_access::{AccessLevel, BoardAccess},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::error::ServiceError;

#[derive(Clone)]
pub struct AccessResolver {
    pool: SqlitePool,
}

impl AccessResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Whether `user_id` holds at least `required` on `board`. Has no side effects.
    pub async fn authorize(
        &self,
        board: &Board,
        user_id: Uuid,
        required: AccessLevel,
    ) -> Result<bool, ServiceError> {
        if board.is_owned_by(user_id) {
            return Ok(true);
        }

        let grant = BoardAccess::find_for_user(&self.pool, board.id, user_id).await?;
        Ok(grant.is_some_and(|g| g.access_level.satisfies(required)))
    }

    /// Load the board and fail unless `user_id` holds `required` on it.
    ///
    /// A missing board is reported before any authorization check.
    pub async fn require_access(
        &self,
        board_id: Uuid,
        user_id: Uuid,
        required: AccessLevel,
    ) -> Result<Board, ServiceError> {
        let board = Board::find_by_id(&self.pool, board_id)
            .await?
            .ok_or(ServiceError::BoardNotFound)?;

        if !self.authorize(&board, user_id, required).await? {
            tracing::debug!(
                board_id = %board_id,
                user_id = %user_id,
                required = %required,
                "Board access denied"
            );
            return Err(ServiceError::unauthorized(format!("{required} access to board required")));
        }

        Ok(board)
    }

    /// Boards the user owns, followed by boards shared with them.
    pub async fn accessible_boards(&self, user_id: Uuid) -> Result<Vec<Board>, ServiceError> {
        let mut boards = Board::find_owned_by(&self.pool, user_id).await?;
        for shared in Board::find_shared_with(&self.pool, user_id).await? {
            if !boards.iter().any(|b| b.id == shared.id) {
                boards.push(shared);
            }
        }
        Ok(boards)
    }
}

#[cfg(test)]
mod tests {
    use db::test_utils::{create_test_board, create_test_pool, create_test_user};

    use super::*;
    use crate::services::error::ErrorKind;

    #[tokio::test]
    async fn test_owner_passes_every_level() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let resolver = AccessResolver::new(pool);

        for level in AccessLevel::ALL {
            assert!(resolver.authorize(&board, owner.id, level).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_grant_level_is_an_upper_bound() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;

        for granted in AccessLevel::ALL {
            let user = create_test_user(&pool, &format!("user-{granted}")).await;
            BoardAccess::create(&pool, board.id, user.id, granted, owner.id)
                .await
                .unwrap();

            let resolver = AccessResolver::new(pool.clone());
            for required in AccessLevel::ALL {
                let allowed = resolver.authorize(&board, user.id, required).await.unwrap();
                assert_eq!(
                    allowed,
                    granted >= required,
                    "granted {granted}, required {required}"
                );
            }
        }
    }

    #[tokio::test]
    async fn test_no_grant_means_no_access() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let stranger = create_test_user(&pool, "stranger").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let resolver = AccessResolver::new(pool);

        assert!(
            !resolver
                .authorize(&board, stranger.id, AccessLevel::Read)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_require_access_distinguishes_missing_board() {
        let (pool, _temp_dir) = create_test_pool().await;
        let owner = create_test_user(&pool, "owner").await;
        let stranger = create_test_user(&pool, "stranger").await;
        let board = create_test_board(&pool, owner.id, "Roadmap").await;
        let resolver = AccessResolver::new(pool);

        let missing = resolver
            .require_access(Uuid::new_v4(), owner.id, AccessLevel::Read)
            .await
            .unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let denied = resolver
            .require_access(board.id, stranger.id, AccessLevel::Read)
            .await
            .unwrap_err();
        assert_eq!(denied.kind(), ErrorKind::Unauthorized);

        let loaded = resolver
            .require_access(board.id, owner.id, AccessLevel::Admin)
            .await
            .unwrap();
        assert_eq!(loaded.id, board.id);
    }

    #[tokio::test]
    async fn test_accessible_boards_lists_owned_then_shared() {
        let (pool, _temp_dir) = create_test_pool().await;
        let alice = create_test_user(&pool, "alice").await;
        let bob = create_test_user(&pool, "bob").await;
        let own = create_test_board(&pool, bob.id, "Bob's").await;
        let shared = create_test_board(&pool, alice.id, "Alice's").await;
        let _hidden = create_test_board(&pool, alice.id, "Private").await;
        BoardAccess::create(&pool, shared.id, bob.id, AccessLevel::Read, alice.id)
            .await
            .unwrap();

        let resolver = AccessResolver::new(pool);
        let ids: Vec<_> = resolver
            .accessible_boards(bob.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![own.id, shared.id]);
    }
}
