//! Realtime delivery over Redis pub/sub.
//!
//! Every message is a JSON envelope `{event, data, sent_at}` published on one
//! of three channel families:
//! - `admin-notifications`: every new admin notification (`new-notification`)
//! - `admin:{id}:notifications`: per-admin unread counter (`unread-count`)
//! - `user:{id}:notifications`: user notifications (`notification`)

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use careerak_common::types::{AdminNotification, Notification};

use crate::dispatcher::DeliveryError;

/// Channel carrying every admin notification.
pub const ADMIN_CHANNEL: &str = "admin-notifications";

pub const EVENT_NEW_NOTIFICATION: &str = "new-notification";
pub const EVENT_UNREAD_COUNT: &str = "unread-count";
pub const EVENT_USER_NOTIFICATION: &str = "notification";

pub fn admin_channel(admin_id: Uuid) -> String {
    format!("admin:{}:notifications", admin_id)
}

pub fn user_channel(user_id: Uuid) -> String {
    format!("user:{}:notifications", user_id)
}

/// Envelope published on every realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    pub data: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

impl RealtimeMessage {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            sent_at: Utc::now(),
        }
    }
}

/// Publishes realtime events; disabled instances drop every message.
#[derive(Clone)]
pub struct RealtimeBroadcaster {
    redis: Option<ConnectionManager>,
}

impl RealtimeBroadcaster {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis: Some(redis) }
    }

    pub fn disabled() -> Self {
        Self { redis: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.redis.is_some()
    }

    /// Publish a message. Returns the number of subscribers that received it.
    pub async fn publish(
        &self,
        channel: &str,
        message: &RealtimeMessage,
    ) -> Result<u64, DeliveryError> {
        let Some(redis) = &self.redis else {
            tracing::debug!(channel, event = %message.event, "Realtime disabled, dropping message");
            return Ok(0);
        };

        let payload = serde_json::to_string(message)?;
        let mut conn = redis.clone();
        let receivers: u64 = conn.publish(channel, payload).await?;

        tracing::debug!(channel, event = %message.event, receivers, "Realtime message published");
        Ok(receivers)
    }

    /// Broadcast a freshly created admin notification to the admin dashboard.
    pub async fn broadcast_admin_notification(
        &self,
        notification: &AdminNotification,
    ) -> Result<u64, DeliveryError> {
        let message =
            RealtimeMessage::new(EVENT_NEW_NOTIFICATION, serde_json::to_value(notification)?);
        self.publish(ADMIN_CHANNEL, &message).await
    }

    /// Push an admin's current unread counter.
    pub async fn broadcast_unread_count(
        &self,
        admin_id: Uuid,
        count: i64,
    ) -> Result<u64, DeliveryError> {
        let message = RealtimeMessage::new(
            EVENT_UNREAD_COUNT,
            serde_json::json!({ "admin_id": admin_id, "count": count }),
        );
        self.publish(&admin_channel(admin_id), &message).await
    }

    /// Deliver a user notification on the user's private channel.
    pub async fn send_to_user(&self, notification: &Notification) -> Result<u64, DeliveryError> {
        let message =
            RealtimeMessage::new(EVENT_USER_NOTIFICATION, serde_json::to_value(notification)?);
        self.publish(&user_channel(notification.recipient_id), &message)
            .await
    }
}
