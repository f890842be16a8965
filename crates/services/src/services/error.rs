use db::validation::ValidationError;
use serde::Serialize;
use thiserror::Error;
use ts_rs::TS;

/// Coarse failure category surfaced to callers of the board core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    ValidationFailure,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Board not found")]
    BoardNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("Access grant not found")]
    GrantNotFound,
    #[error("Notification not found")]
    NotificationNotFound,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("User already has access to this board; update the existing grant instead")]
    GrantExists,
    #[error("Board owner access is implicit and cannot be granted, changed or revoked")]
    OwnerAccessImmutable,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::BoardNotFound
            | ServiceError::UserNotFound
            | ServiceError::GrantNotFound
            | ServiceError::NotificationNotFound => ErrorKind::NotFound,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::GrantExists => ErrorKind::Conflict,
            ServiceError::OwnerAccessImmutable | ServiceError::Validation(_) => {
                ErrorKind::ValidationFailure
            }
            ServiceError::Database(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn unauthorized(msg: impl Into<String>) -> Self {
        ServiceError::Unauthorized(msg.into())
    }
}

/// Whether `err` is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
