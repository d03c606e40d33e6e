//! Channel bundle handed to the notification services.

use thiserror::Error;

use careerak_common::error::AppError;
use careerak_common::types::{Notification, TypeSetting};

use crate::email::{EmailSender, render_notification_email};
use crate::realtime::RealtimeBroadcaster;

/// Failure while handing a message to a delivery channel.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Redis publish failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        AppError::Delivery(err.to_string())
    }
}

/// Which channels accepted a user notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub push_sent: bool,
    pub email_sent: bool,
}

/// Realtime and email channels, cloned into every service that delivers.
#[derive(Clone)]
pub struct NotificationDispatcher {
    pub realtime: RealtimeBroadcaster,
    pub email: EmailSender,
}

impl NotificationDispatcher {
    pub fn new(realtime: RealtimeBroadcaster, email: EmailSender) -> Self {
        Self { realtime, email }
    }

    /// Dispatcher with every channel disabled.
    pub fn disabled() -> Self {
        Self::new(RealtimeBroadcaster::disabled(), EmailSender::disabled())
    }

    /// Deliver a persisted user notification over the channels its type
    /// setting asks for. Channel failures are logged and reported as not sent.
    pub async fn deliver_user(
        &self,
        notification: &Notification,
        setting: TypeSetting,
        email_to: Option<&str>,
    ) -> DeliveryOutcome {
        let mut outcome = DeliveryOutcome::default();

        if setting.push && self.realtime.is_enabled() {
            match self.realtime.send_to_user(notification).await {
                Ok(_) => outcome.push_sent = true,
                Err(e) => tracing::warn!(
                    notification_id = %notification.id,
                    error = %e,
                    "Realtime delivery failed"
                ),
            }
        }

        if setting.email {
            match email_to {
                Some(to) => {
                    let message = render_notification_email(
                        to,
                        &notification.title,
                        &notification.message,
                        None,
                    );
                    match self.email.send(&message).await {
                        Ok(sent) => outcome.email_sent = sent,
                        Err(e) => tracing::warn!(
                            notification_id = %notification.id,
                            error = %e,
                            "Email delivery failed"
                        ),
                    }
                }
                None => tracing::debug!(
                    notification_id = %notification.id,
                    "Email requested but recipient has no address"
                ),
            }
        }

        outcome
    }
}
