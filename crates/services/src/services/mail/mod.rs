//! Outbound notification email.
//!
//! [`MailGateway`] is the seam to whatever delivers mail. [`from_config`] picks
//! the HTTP gateway when mail is enabled and an endpoint is configured, and
//! otherwise a gateway that only logs.

mod http;
mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use db::models::{change_log::EntityType, notification::NotificationType};
pub use http::HttpMailGateway;
pub use mock::RecordingMailGateway;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use super::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail transport error: {0}")]
    Transport(String),
    #[error("Mail endpoint rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Sent,
    /// Logged only; mail delivery is disabled.
    Simulated,
}

#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryStatus, MailError>;
}

/// Gateway used while mail is disabled. Never fails.
#[derive(Debug, Clone, Default)]
pub struct LoggingMailGateway;

#[async_trait]
impl MailGateway for LoggingMailGateway {
    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryStatus, MailError> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.text,
            "Email (simulated)"
        );
        Ok(DeliveryStatus::Simulated)
    }
}

pub fn from_config(config: &MailConfig) -> Arc<dyn MailGateway> {
    if !config.enabled {
        tracing::info!("Mail delivery disabled, notification emails will be logged only");
        return Arc::new(LoggingMailGateway);
    }

    let Some(endpoint) = config.endpoint.as_deref() else {
        tracing::warn!("Mail enabled but no endpoint configured, falling back to logging");
        return Arc::new(LoggingMailGateway);
    };

    match HttpMailGateway::new(endpoint, config.api_token.clone()) {
        Ok(gateway) => {
            tracing::info!(endpoint, from = %config.from_address, "Mail gateway initialized");
            Arc::new(gateway)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to initialize mail gateway, falling back to logging"
            );
            Arc::new(LoggingMailGateway)
        }
    }
}

pub fn subject_for(notification_type: NotificationType) -> &'static str {
    match notification_type {
        NotificationType::TaskCreated => "[OpenFlow] New Task Created",
        NotificationType::TaskUpdated => "[OpenFlow] Task Updated",
        NotificationType::TaskDeleted => "[OpenFlow] Task Deleted",
        NotificationType::TaskMoved => "[OpenFlow] Task Moved",
        NotificationType::BoardUpdated => "[OpenFlow] Board Updated",
        NotificationType::StatusCreated => "[OpenFlow] New Status Created",
        NotificationType::StatusUpdated => "[OpenFlow] Status Updated",
        NotificationType::StatusDeleted => "[OpenFlow] Status Deleted",
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Subject plus text and HTML bodies for one notification.
pub fn compose_notification_email(
    config: &MailConfig,
    to: &str,
    notification_type: NotificationType,
    message: &str,
    reference_type: EntityType,
    reference_id: Uuid,
) -> OutboundEmail {
    let kind = reference_type.to_string().to_lowercase().replace('_', " ");
    let reference = format!("{reference_type} #{reference_id}");

    let text = format!(
        "OpenFlow Notification\n\n\
         {message}\n\n\
         Reference: {reference}\n\n\
         View in OpenFlow: {app_url}\n\n\
         ---\n\
         You received this email because you subscribed to notifications for this {kind}.\n\
         To manage your notification preferences, visit your OpenFlow settings.\n",
        app_url = config.app_url,
    );

    let html = format!(
        r##"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
  <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="background-color: #82AAFF; color: white; padding: 20px; border-radius: 8px 8px 0 0;">OpenFlow Notification</h1>
    <div style="background-color: #f5f5f5; padding: 20px; border-radius: 0 0 8px 8px;">
      <p>{message}</p>
      <p><strong>Reference:</strong> {reference}</p>
      <a href="{app_url}">View in OpenFlow</a>
    </div>
    <p style="font-size: 12px; color: #666;">You received this email because you subscribed to notifications for this {kind}.</p>
  </div>
</body>
</html>
"##,
        message = escape_html(message),
        app_url = escape_html(&config.app_url),
    );

    OutboundEmail {
        from: config.from_address.clone(),
        to: to.to_string(),
        subject: subject_for(notification_type).to_string(),
        text,
        html,
    }
}
