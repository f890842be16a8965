//! Notification fan-out and the recipient's read side.
//!
//! [`NotificationDispatcher::fan_out`] delivers one entity-change event to every
//! subscriber except the actor. Delivery is best-effort per subscriber and per
//! channel: a failed in-app insert or email is logged and recorded in the
//! [`FanOutReport`], and processing moves on to the next channel and subscriber.

use std::sync::Arc;

use db::models::{
    alert_subscription::AlertSubscription,
    change_log::EntityType,
    notification::{CreateNotification, Notification, NotificationType},
};
use serde::Serialize;
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    config::{Config, MailConfig},
    error::ServiceError,
    mail::{DeliveryStatus, MailGateway, compose_notification_email},
    subscriptions::SubscriptionRegistry,
    user_directory::UserDirectory,
};

pub const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum InAppOutcome {
    Created(Uuid),
    Disabled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum EmailOutcome {
    Delivered,
    /// Mail is disabled; the message was only logged.
    Simulated,
    Disabled,
    NoAddress,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct SubscriberDelivery {
    pub user_id: Uuid,
    pub in_app: InAppOutcome,
    pub email: EmailOutcome,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct FanOutReport {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    /// The actor was subscribed and was skipped.
    pub skipped_actor: bool,
    pub deliveries: Vec<SubscriberDelivery>,
}

impl FanOutReport {
    pub fn notifications_created(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.in_app, InAppOutcome::Created(_)))
            .count()
    }

    pub fn emails_sent(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.email, EmailOutcome::Delivered | EmailOutcome::Simulated))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.deliveries
            .iter()
            .map(|d| {
                usize::from(matches!(d.in_app, InAppOutcome::Failed(_)))
                    + usize::from(matches!(d.email, EmailOutcome::Failed(_)))
            })
            .sum()
    }

    pub fn recipients(&self) -> Vec<Uuid> {
        self.deliveries.iter().map(|d| d.user_id).collect()
    }
}

struct ChangeEvent<'a> {
    entity_type: EntityType,
    entity_id: Uuid,
    notification_type: NotificationType,
    message: &'a str,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    pool: SqlitePool,
    subscriptions: SubscriptionRegistry,
    users: Arc<dyn UserDirectory>,
    mailer: Arc<dyn MailGateway>,
    mail: MailConfig,
    notification_limit: i64,
}

impl NotificationDispatcher {
    pub fn new(
        pool: SqlitePool,
        users: Arc<dyn UserDirectory>,
        mailer: Arc<dyn MailGateway>,
        config: &Config,
    ) -> Self {
        Self {
            subscriptions: SubscriptionRegistry::new(pool.clone(), users.clone()),
            pool,
            users,
            mailer,
            mail: config.mail.clone(),
            notification_limit: config.notification_limit.max(1),
        }
    }

    /// Notify every subscriber of the entity except `actor_id`.
    ///
    /// Only failing to load the subscriber list is an error; per-subscriber
    /// failures are reported in the returned [`FanOutReport`].
    pub async fn fan_out(
        &self,
        entity_type: EntityType,
        entity_id: Uuid,
        notification_type: NotificationType,
        message: &str,
        actor_id: Option<Uuid>,
    ) -> Result<FanOutReport, ServiceError> {
        let subscribers = self
            .subscriptions
            .list_for_entity(entity_type, entity_id)
            .await?;
        let event = ChangeEvent {
            entity_type,
            entity_id,
            notification_type,
            message,
        };

        let mut report = FanOutReport {
            entity_type,
            entity_id,
            skipped_actor: false,
            deliveries: Vec::with_capacity(subscribers.len()),
        };

        for subscription in subscribers {
            if actor_id == Some(subscription.user_id) {
                report.skipped_actor = true;
                continue;
            }

            let in_app = self.deliver_in_app(&subscription, &event).await;
            let email = self.deliver_email(&subscription, &event).await;
            report.deliveries.push(SubscriberDelivery {
                user_id: subscription.user_id,
                in_app,
                email,
            });
        }

        tracing::debug!(
            entity_type = %entity_type,
            entity_id = %entity_id,
            notification_type = %notification_type,
            recipients = report.deliveries.len(),
            notifications = report.notifications_created(),
            emails = report.emails_sent(),
            failures = report.failures(),
            "Fan-out complete"
        );

        Ok(report)
    }

    async fn deliver_in_app(
        &self,
        subscription: &AlertSubscription,
        event: &ChangeEvent<'_>,
    ) -> InAppOutcome {
        if !subscription.in_app_enabled {
            return InAppOutcome::Disabled;
        }

        let data = CreateNotification {
            user_id: subscription.user_id,
            notification_type: event.notification_type,
            message: event.message.to_string(),
            reference_type: event.entity_type,
            reference_id: event.entity_id,
        };
        match Notification::create(&self.pool, &data).await {
            Ok(notification) => InAppOutcome::Created(notification.id),
            Err(e) => {
                tracing::error!(
                    user_id = %subscription.user_id,
                    entity_type = %event.entity_type,
                    entity_id = %event.entity_id,
                    error = %e,
                    "Failed to create in-app notification"
                );
                InAppOutcome::Failed(e.to_string())
            }
        }
    }

    async fn deliver_email(
        &self,
        subscription: &AlertSubscription,
        event: &ChangeEvent<'_>,
    ) -> EmailOutcome {
        if !subscription.email_enabled {
            return EmailOutcome::Disabled;
        }

        let address = match self.users.email(subscription.user_id).await {
            Ok(Some(address)) => address,
            Ok(None) => {
                tracing::warn!(
                    user_id = %subscription.user_id,
                    "Subscriber has no email address, skipping email"
                );
                return EmailOutcome::NoAddress;
            }
            Err(e) => {
                tracing::error!(
                    user_id = %subscription.user_id,
                    error = %e,
                    "Failed to resolve subscriber email"
                );
                return EmailOutcome::Failed(e.to_string());
            }
        };

        let email = compose_notification_email(
            &self.mail,
            &address,
            event.notification_type,
            event.message,
            event.entity_type,
            event.entity_id,
        );
        match self.mailer.send(&email).await {
            Ok(DeliveryStatus::Sent) => EmailOutcome::Delivered,
            Ok(DeliveryStatus::Simulated) => EmailOutcome::Simulated,
            Err(e) => {
                tracing::error!(
                    user_id = %subscription.user_id,
                    to = %address,
                    error = %e,
                    "Failed to send notification email"
                );
                EmailOutcome::Failed(e.to_string())
            }
        }
    }

    /// Most recent notifications for the user, newest first.
    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(Notification::find_recent_for_user(&self.pool, user_id, self.notification_limit).await?)
    }

    pub async fn get_unread_notifications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, ServiceError> {
        Ok(Notification::find_unread_for_user(&self.pool, user_id).await?)
    }

    pub async fn get_unread_count(&self, user_id: Uuid) -> Result<i64, ServiceError> {
        Ok(Notification::count_unread(&self.pool, user_id).await?)
    }

    /// Only the recipient may mark a notification read.
    pub async fn mark_as_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, ServiceError> {
        let mut notification = Notification::find_by_id(&self.pool, notification_id)
            .await?
            .ok_or(ServiceError::NotificationNotFound)?;

        if notification.user_id != user_id {
            tracing::warn!(
                notification_id = %notification_id,
                user_id = %user_id,
                "Rejected mark-as-read from non-recipient"
            );
            return Err(ServiceError::unauthorized("Notification belongs to another user"));
        }

        if !notification.is_read {
            Notification::mark_read(&self.pool, notification_id).await?;
            notification.is_read = true;
        }
        Ok(notification)
    }

    /// Returns how many notifications changed state.
    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(Notification::mark_all_read_for_user(&self.pool, user_id).await?)
    }
}
