//! Parsing of caller-supplied enum strings.
//!
//! Entity types, access levels and notification types arrive from callers as
//! loose strings (`"task"`, `"Write"`). They are trimmed and matched
//! case-insensitively; anything else is a [`ValidationError`].

use std::str::FromStr;

use thiserror::Error;

use crate::models::{
    board_access::AccessLevel, change_log::EntityType, notification::NotificationType,
};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid access level: '{0}'. Valid values: READ, WRITE, ADMIN")]
    InvalidAccessLevel(String),

    #[error("Invalid entity type: '{0}'. Valid values: TASK, BOARD, STATUS, COMMENT, CUSTOM_FIELD")]
    InvalidEntityType(String),

    #[error("Invalid notification type: '{0}'")]
    InvalidNotificationType(String),

    #[error("Entity type {0} does not support subscriptions")]
    NotSubscribable(EntityType),
}

/// Entity types users may subscribe to. `COMMENT` and `CUSTOM_FIELD` only appear in the audit log.
pub const SUBSCRIBABLE_ENTITY_TYPES: &[EntityType] =
    &[EntityType::Task, EntityType::Board, EntityType::Status];

/// # Examples
/// ```
/// use db::{models::board_access::AccessLevel, validation::parse_access_level};
///
/// assert_eq!(parse_access_level("write"), Ok(AccessLevel::Write));
/// assert!(parse_access_level("owner").is_err());
/// ```
pub fn parse_access_level(value: &str) -> Result<AccessLevel, ValidationError> {
    AccessLevel::from_str(value.trim())
        .map_err(|_| ValidationError::InvalidAccessLevel(value.to_string()))
}

/// # Examples
/// ```
/// use db::{models::change_log::EntityType, validation::parse_entity_type};
///
/// assert_eq!(parse_entity_type("custom_field"), Ok(EntityType::CustomField));
/// assert!(parse_entity_type("project").is_err());
/// ```
pub fn parse_entity_type(value: &str) -> Result<EntityType, ValidationError> {
    EntityType::from_str(value.trim())
        .map_err(|_| ValidationError::InvalidEntityType(value.to_string()))
}

pub fn parse_notification_type(value: &str) -> Result<NotificationType, ValidationError> {
    NotificationType::from_str(value.trim())
        .map_err(|_| ValidationError::InvalidNotificationType(value.to_string()))
}

pub fn ensure_subscribable(entity_type: EntityType) -> Result<(), ValidationError> {
    if SUBSCRIBABLE_ENTITY_TYPES.contains(&entity_type) {
        Ok(())
    } else {
        Err(ValidationError::NotSubscribable(entity_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_access_level_is_case_insensitive() {
        assert_eq!(parse_access_level("READ"), Ok(AccessLevel::Read));
        assert_eq!(parse_access_level("Write"), Ok(AccessLevel::Write));
        assert_eq!(parse_access_level(" admin "), Ok(AccessLevel::Admin));
    }

    #[test]
    fn test_parse_access_level_invalid() {
        assert!(parse_access_level("").is_err());
        assert!(parse_access_level("OWNER").is_err());
        let err = parse_access_level("superuser").unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidAccessLevel("superuser".to_string())
        );
        assert!(err.to_string().contains("superuser"));
    }

    #[test]
    fn test_parse_entity_type() {
        assert_eq!(parse_entity_type("task"), Ok(EntityType::Task));
        assert_eq!(parse_entity_type("BOARD"), Ok(EntityType::Board));
        assert_eq!(parse_entity_type("Status"), Ok(EntityType::Status));
        assert_eq!(
            parse_entity_type("CUSTOM_FIELD"),
            Ok(EntityType::CustomField)
        );
        assert!(parse_entity_type("custom-field").is_err());
        assert!(parse_entity_type("attachment").is_err());
    }

    #[test]
    fn test_parse_notification_type() {
        assert_eq!(
            parse_notification_type("task_moved"),
            Ok(NotificationType::TaskMoved)
        );
        assert!(parse_notification_type("TASK_EXPLODED").is_err());
    }

    #[test]
    fn test_only_task_board_status_are_subscribable() {
        assert!(ensure_subscribable(EntityType::Task).is_ok());
        assert!(ensure_subscribable(EntityType::Board).is_ok());
        assert!(ensure_subscribable(EntityType::Status).is_ok());
        assert_eq!(
            ensure_subscribable(EntityType::CustomField),
            Err(ValidationError::NotSubscribable(EntityType::CustomField))
        );
        assert!(ensure_subscribable(EntityType::Comment).is_err());
    }
}
