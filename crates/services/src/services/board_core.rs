//! Write-path facade for entity services.
//!
//! An entity service checks access with [`BoardCore::require`], performs its own
//! mutation, then hands everything that changed to [`BoardCore::publish`] as one
//! [`ChangeSet`]. Publishing audits first and fans out afterwards.
//!
//! Callers holding raw request strings use the `*_str` variants, which parse
//! through [`db::validation`] before touching the database.

use std::sync::Arc;

use db::{
    DBService,
    models::{
        alert_subscription::AlertSubscription,
        board::Board,
        board_access::AccessLevel,
        change_log::{ChangeLog, EntityType},
        notification::NotificationType,
    },
    validation::{ValidationError, parse_access_level, parse_entity_type, parse_notification_type},
};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    access::AccessResolver,
    access_grants::{AccessGrantManager, BoardAccessWithUsers},
    change_audit::{ChangeAuditLog, ChangeLogWithUser},
    config::Config,
    error::ServiceError,
    mail::{self, MailGateway},
    notifications::{FanOutReport, NotificationDispatcher},
    subscriptions::{SubscriptionPreferences, SubscriptionRegistry},
    user_directory::{DbUserDirectory, UserDirectory},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created,
    Deleted,
    Field {
        name: String,
        old: Option<String>,
        new: Option<String>,
    },
    Moved {
        from: String,
        to: String,
    },
}

/// Notification to send once the changes are recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub notification_type: NotificationType,
    pub message: String,
}

/// Everything one mutation changed on one entity.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub changes: Vec<Change>,
    pub notice: Option<Notice>,
}

impl ChangeSet {
    pub fn new(entity_type: EntityType, entity_id: Uuid, actor_id: Option<Uuid>) -> Self {
        Self {
            entity_type,
            entity_id,
            actor_id,
            changes: Vec::new(),
            notice: None,
        }
    }

    pub fn created(mut self) -> Self {
        self.changes.push(Change::Created);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.changes.push(Change::Deleted);
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        old: Option<impl ToString>,
        new: Option<impl ToString>,
    ) -> Self {
        self.changes.push(Change::Field {
            name: name.into(),
            old: old.map(|v| v.to_string()),
            new: new.map(|v| v.to_string()),
        });
        self
    }

    pub fn moved(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.changes.push(Change::Moved {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn notify(
        mut self,
        notification_type: NotificationType,
        message: impl Into<String>,
    ) -> Self {
        self.notice = Some(Notice {
            notification_type,
            message: message.into(),
        });
        self
    }

    /// [`ChangeSet::notify`] with the type given as text, e.g. `"task_moved"`.
    pub fn notify_str(
        self,
        notification_type: &str,
        message: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let notification_type = parse_notification_type(notification_type)?;
        Ok(self.notify(notification_type, message))
    }
}

#[derive(Debug)]
pub enum FanOutStatus {
    /// Nothing was recorded, or no notice was attached.
    Skipped,
    Completed(FanOutReport),
    /// The subscriber list could not be loaded. The recorded changes stand.
    Failed(String),
}

#[derive(Debug)]
pub struct PublishOutcome {
    pub entries: Vec<ChangeLog>,
    pub fan_out: FanOutStatus,
}

#[derive(Clone)]
pub struct BoardCore {
    pub access: AccessResolver,
    pub grants: AccessGrantManager,
    pub audit: ChangeAuditLog,
    pub subscriptions: SubscriptionRegistry,
    pub notifications: NotificationDispatcher,
}

impl BoardCore {
    pub fn new(
        pool: SqlitePool,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn MailGateway>,
        config: &Config,
    ) -> Self {
        Self {
            access: AccessResolver::new(pool.clone()),
            grants: AccessGrantManager::new(pool.clone(), users.clone()),
            audit: ChangeAuditLog::new(pool.clone(), users.clone())
                .with_history_limit(config.history_limit),
            subscriptions: SubscriptionRegistry::new(pool.clone(), users.clone()),
            notifications: NotificationDispatcher::new(pool, users, mailer, config),
        }
    }

    /// Wire the core against the local user table and the configured mail gateway.
    pub fn from_db(db: &DBService, config: &Config) -> Self {
        let users: Arc<dyn UserDirectory> = Arc::new(DbUserDirectory::new(db.pool.clone()));
        Self::new(
            db.pool.clone(),
            users,
            mail::from_config(&config.mail),
            config,
        )
    }

    pub async fn require(
        &self,
        board_id: Uuid,
        user_id: Uuid,
        level: AccessLevel,
    ) -> Result<Board, ServiceError> {
        self.access.require_access(board_id, user_id, level).await
    }

    /// Grant with the level given as text. An unknown level is rejected before
    /// any lookup.
    pub async fn grant_str(
        &self,
        board_id: Uuid,
        target_user_id: Uuid,
        level: &str,
        requester_id: Uuid,
    ) -> Result<BoardAccessWithUsers, ServiceError> {
        let level = parse_access_level(level)?;
        self.grants
            .grant(board_id, target_user_id, level, requester_id)
            .await
    }

    pub async fn subscribe_str(
        &self,
        user_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        preferences: SubscriptionPreferences,
    ) -> Result<AlertSubscription, ServiceError> {
        let entity_type = parse_entity_type(entity_type)?;
        self.subscriptions
            .subscribe(user_id, entity_type, entity_id, preferences)
            .await
    }

    pub async fn history_str(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<ChangeLogWithUser>, ServiceError> {
        let entity_type = parse_entity_type(entity_type)?;
        self.audit.history(entity_type, entity_id).await
    }

    /// Record every change, then fan out the notice once if anything was recorded.
    ///
    /// Errors only if an audit write fails. Fan-out problems are reported in the
    /// outcome.
    pub async fn publish(&self, set: ChangeSet) -> Result<PublishOutcome, ServiceError> {
        let ChangeSet {
            entity_type,
            entity_id,
            actor_id,
            changes,
            notice,
        } = set;

        let mut entries = Vec::with_capacity(changes.len());
        for change in changes {
            let recorded = match change {
                Change::Created => Some(
                    self.audit
                        .record_create(entity_type, entity_id, actor_id)
                        .await?,
                ),
                Change::Deleted => Some(
                    self.audit
                        .record_delete(entity_type, entity_id, actor_id)
                        .await?,
                ),
                Change::Field { name, old, new } => {
                    self.audit
                        .record_field_change(
                            entity_type,
                            entity_id,
                            actor_id,
                            &name,
                            old.as_deref(),
                            new.as_deref(),
                        )
                        .await?
                }
                Change::Moved { from, to } => Some(
                    self.audit
                        .record_move(entity_type, entity_id, actor_id, &from, &to)
                        .await?,
                ),
            };
            entries.extend(recorded);
        }

        let fan_out = match notice {
            Some(notice) if !entries.is_empty() => match self
                .notifications
                .fan_out(
                    entity_type,
                    entity_id,
                    notice.notification_type,
                    &notice.message,
                    actor_id,
                )
                .await
            {
                Ok(report) => FanOutStatus::Completed(report),
                Err(e) => {
                    tracing::error!(
                        entity_type = %entity_type,
                        entity_id = %entity_id,
                        error = %e,
                        "Fan-out failed after changes were recorded"
                    );
                    FanOutStatus::Failed(e.to_string())
                }
            },
            _ => FanOutStatus::Skipped,
        };

        Ok(PublishOutcome { entries, fan_out })
    }
}
