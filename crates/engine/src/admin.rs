//! Admin notification fan-out.
//!
//! Platform events are turned into one notification per admin/moderator.
//! Each recipient's preferences are consulted before insert: disabled types are
//! skipped and non-urgent notifications are held back during quiet hours.
//! Inserted rows are broadcast on the admin realtime channels afterwards.

use std::collections::HashSet;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::{
    AdminNotification, AdminNotificationType, NotificationPreference, Pagination, Priority,
};
use careerak_notifier::NotificationDispatcher;

use crate::preferences::PreferenceService;

/// Who receives an admin notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminTarget {
    /// Every admin and moderator.
    All,
    One(Uuid),
    Many(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub struct CreateAdminNotificationParams {
    pub target: AdminTarget,
    pub notification_type: AdminNotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub related_id: Option<String>,
    pub related_type: Option<String>,
}

/// Outcome of the per-recipient preference check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminDecision {
    Deliver,
    Disabled,
    QuietHours,
}

/// Split requested ids into those present in `known` and those missing,
/// keeping request order and dropping repeats.
pub fn retain_known(requested: &[Uuid], known: &HashSet<Uuid>) -> (Vec<Uuid>, Vec<Uuid>) {
    let mut seen = HashSet::with_capacity(requested.len());
    let mut found = Vec::with_capacity(requested.len());
    let mut missing = Vec::new();
    for id in requested {
        if !seen.insert(*id) {
            continue;
        }
        if known.contains(id) {
            found.push(*id);
        } else {
            missing.push(*id);
        }
    }
    (found, missing)
}

/// Decide whether one admin receives a notification. No stored preferences
/// means everything is enabled and quiet hours are off.
pub fn decide(
    prefs: Option<&NotificationPreference>,
    notification_type: AdminNotificationType,
    priority: Priority,
    now: NaiveTime,
) -> AdminDecision {
    let Some(prefs) = prefs else {
        return AdminDecision::Deliver;
    };

    if !prefs.admin_enabled(notification_type) {
        return AdminDecision::Disabled;
    }
    if priority != Priority::Urgent && prefs.quiet_hours.is_active_at(now) {
        return AdminDecision::QuietHours;
    }
    AdminDecision::Deliver
}

/// Query filters for listing an admin's notifications.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminNotificationFilter {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub notification_type: Option<AdminNotificationType>,
    pub priority: Option<Priority>,
    pub is_read: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminNotificationPage {
    pub notifications: Vec<AdminNotification>,
    pub pagination: Pagination,
    pub unread_count: i64,
}

/// Platform events that produce admin notifications.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AdminEvent {
    UserRegistered {
        user_id: String,
        name: String,
        role: String,
    },
    JobPosted {
        job_id: String,
        title: String,
        company: String,
    },
    CoursePublished {
        course_id: String,
        title: String,
        instructor: String,
    },
    ReviewFlagged {
        review_id: String,
        reason: String,
    },
    ContentReported {
        content_type: String,
        content_id: String,
        reason: String,
    },
    SuspiciousActivity {
        user_id: String,
        description: String,
    },
    SystemError {
        error: String,
        context: Option<String>,
    },
}

// Shared by the list and count queries; $1 is the admin id.
const LIST_FILTER: &str = r#"
    WHERE admin_id = $1
      AND ($2::text IS NULL OR type = $2)
      AND ($3::text IS NULL OR priority = $3)
      AND ($4::bool IS NULL OR is_read = $4)
      AND ($5::timestamptz IS NULL OR created_at >= $5)
      AND ($6::timestamptz IS NULL OR created_at <= $6)
"#;

/// Service layer for admin notifications.
#[derive(Clone)]
pub struct AdminNotificationService {
    pool: PgPool,
    dispatcher: NotificationDispatcher,
}

impl AdminNotificationService {
    pub fn new(pool: PgPool, dispatcher: NotificationDispatcher) -> Self {
        Self { pool, dispatcher }
    }

    /// Create and broadcast a notification for every admin in the target,
    /// evaluating quiet hours against the server's local time.
    pub async fn create(
        &self,
        params: &CreateAdminNotificationParams,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create_at(params, crate::local_wall_clock()).await
    }

    /// [`create`](Self::create) with an explicit wall-clock time.
    pub async fn create_at(
        &self,
        params: &CreateAdminNotificationParams,
        now: NaiveTime,
    ) -> Result<Vec<AdminNotification>, AppError> {
        let admin_ids = self.resolve_target(&params.target).await?;
        if admin_ids.is_empty() {
            tracing::warn!(
                notification_type = %params.notification_type,
                "No admins to notify"
            );
            return Ok(Vec::new());
        }

        let mut recipients = Vec::with_capacity(admin_ids.len());
        for admin_id in admin_ids {
            let prefs = match PreferenceService::find(&self.pool, admin_id).await {
                Ok(prefs) => prefs,
                Err(e) => {
                    tracing::warn!(admin_id = %admin_id, error = %e, "Preference lookup failed, delivering");
                    None
                }
            };

            match decide(prefs.as_ref(), params.notification_type, params.priority, now) {
                AdminDecision::Deliver => recipients.push(admin_id),
                AdminDecision::Disabled => tracing::info!(
                    admin_id = %admin_id,
                    notification_type = %params.notification_type,
                    "Admin notification skipped: type disabled"
                ),
                AdminDecision::QuietHours => tracing::info!(
                    admin_id = %admin_id,
                    notification_type = %params.notification_type,
                    "Admin notification skipped: quiet hours"
                ),
            }
        }

        // All inserts commit together so nothing is broadcast for a failed batch.
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(recipients.len());
        for admin_id in recipients {
            let notification: AdminNotification = sqlx::query_as(
                r#"
                INSERT INTO admin_notifications
                    (id, admin_id, type, priority, title, message, action_url, related_id, related_type)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(admin_id)
            .bind(params.notification_type.as_str())
            .bind(params.priority.as_str())
            .bind(&params.title)
            .bind(&params.message)
            .bind(params.action_url.as_deref())
            .bind(params.related_id.as_deref())
            .bind(params.related_type.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::missing_reference(e, "Admin"))?;

            created.push(notification);
        }
        tx.commit().await?;

        for notification in &created {
            self.broadcast(notification).await;
        }

        tracing::info!(
            notification_type = %params.notification_type,
            priority = %params.priority,
            delivered = created.len(),
            "Admin notifications created"
        );

        Ok(created)
    }

    async fn resolve_target(&self, target: &AdminTarget) -> Result<Vec<Uuid>, AppError> {
        match target {
            AdminTarget::All => {
                let ids: Vec<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM users WHERE role IN ('admin', 'moderator') ORDER BY created_at",
                )
                .fetch_all(&self.pool)
                .await?;
                Ok(ids)
            }
            AdminTarget::One(id) => self.existing_users(std::slice::from_ref(id)).await,
            AdminTarget::Many(ids) => self.existing_users(ids).await,
        }
    }

    /// Drop ids with no user row so one stale id cannot sink the whole batch.
    async fn existing_users(&self, requested: &[Uuid]) -> Result<Vec<Uuid>, AppError> {
        let rows: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE id = ANY($1)")
            .bind(requested)
            .fetch_all(&self.pool)
            .await?;
        let known: HashSet<Uuid> = rows.into_iter().collect();

        let (found, missing) = retain_known(requested, &known);
        for admin_id in &missing {
            tracing::warn!(admin_id = %admin_id, "Admin notification skipped: unknown user");
        }
        Ok(found)
    }

    async fn broadcast(&self, notification: &AdminNotification) {
        if let Err(e) = self
            .dispatcher
            .realtime
            .broadcast_admin_notification(notification)
            .await
        {
            tracing::warn!(
                notification_id = %notification.id,
                error = %e,
                "Failed to broadcast admin notification"
            );
        }
        self.broadcast_unread_count(notification.admin_id).await;
    }

    async fn broadcast_unread_count(&self, admin_id: Uuid) {
        let count = match self.unread_count(admin_id).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(admin_id = %admin_id, error = %e, "Failed to count unread notifications");
                return;
            }
        };
        if let Err(e) = self
            .dispatcher
            .realtime
            .broadcast_unread_count(admin_id, count)
            .await
        {
            tracing::warn!(admin_id = %admin_id, error = %e, "Failed to broadcast unread count");
        }
    }

    /// Newest-first page of an admin's notifications.
    pub async fn list(
        &self,
        admin_id: Uuid,
        filter: &AdminNotificationFilter,
    ) -> Result<AdminNotificationPage, AppError> {
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::Validation(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        let (page, limit) = Pagination::clamp(filter.page, filter.limit);
        let notification_type = filter.notification_type.map(|t| t.as_str());
        let priority = filter.priority.map(|p| p.as_str());

        let list_sql = format!(
            "SELECT * FROM admin_notifications {} ORDER BY created_at DESC LIMIT $7 OFFSET $8",
            LIST_FILTER
        );
        let notifications: Vec<AdminNotification> = sqlx::query_as(&list_sql)
            .bind(admin_id)
            .bind(notification_type)
            .bind(priority)
            .bind(filter.is_read)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .bind(i64::from(limit))
            .bind(Pagination::offset(page, limit))
            .fetch_all(&self.pool)
            .await?;

        let count_sql = format!("SELECT COUNT(*) FROM admin_notifications {}", LIST_FILTER);
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(admin_id)
            .bind(notification_type)
            .bind(priority)
            .bind(filter.is_read)
            .bind(filter.start_date)
            .bind(filter.end_date)
            .fetch_one(&self.pool)
            .await?;

        let unread_count = self.unread_count(admin_id).await?;

        Ok(AdminNotificationPage {
            notifications,
            pagination: Pagination::new(page, limit, total.max(0) as u64),
            unread_count,
        })
    }

    pub async fn unread_count(&self, admin_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM admin_notifications WHERE admin_id = $1 AND NOT is_read",
        )
        .bind(admin_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Mark one of the admin's notifications read.
    pub async fn mark_as_read(
        &self,
        notification_id: Uuid,
        admin_id: Uuid,
    ) -> Result<AdminNotification, AppError> {
        let notification: AdminNotification = sqlx::query_as(
            r#"
            UPDATE admin_notifications
            SET is_read = TRUE
            WHERE id = $1 AND admin_id = $2
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        self.broadcast_unread_count(admin_id).await;
        Ok(notification)
    }

    /// Mark every unread notification read. Returns how many changed.
    pub async fn mark_all_as_read(&self, admin_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE admin_notifications SET is_read = TRUE WHERE admin_id = $1 AND NOT is_read",
        )
        .bind(admin_id)
        .execute(&self.pool)
        .await?;

        let modified = result.rows_affected();
        tracing::info!(admin_id = %admin_id, modified, "Admin notifications marked read");

        self.broadcast_unread_count(admin_id).await;
        Ok(modified)
    }

    pub async fn delete(
        &self,
        notification_id: Uuid,
        admin_id: Uuid,
    ) -> Result<AdminNotification, AppError> {
        let notification: AdminNotification = sqlx::query_as(
            "DELETE FROM admin_notifications WHERE id = $1 AND admin_id = $2 RETURNING *",
        )
        .bind(notification_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        tracing::info!(notification_id = %notification_id, admin_id = %admin_id, "Admin notification deleted");

        if !notification.is_read {
            self.broadcast_unread_count(admin_id).await;
        }
        Ok(notification)
    }

    /// Route an ingested platform event to its helper.
    pub async fn handle_event(
        &self,
        event: &AdminEvent,
    ) -> Result<Vec<AdminNotification>, AppError> {
        match event {
            AdminEvent::UserRegistered {
                user_id,
                name,
                role,
            } => self.notify_user_registered(user_id, name, role).await,
            AdminEvent::JobPosted {
                job_id,
                title,
                company,
            } => self.notify_job_posted(job_id, title, company).await,
            AdminEvent::CoursePublished {
                course_id,
                title,
                instructor,
            } => self.notify_course_published(course_id, title, instructor).await,
            AdminEvent::ReviewFlagged { review_id, reason } => {
                self.notify_review_flagged(review_id, reason).await
            }
            AdminEvent::ContentReported {
                content_type,
                content_id,
                reason,
            } => {
                self.notify_content_reported(content_type, content_id, reason)
                    .await
            }
            AdminEvent::SuspiciousActivity {
                user_id,
                description,
            } => self.notify_suspicious_activity(user_id, description).await,
            AdminEvent::SystemError { error, context } => {
                self.notify_system_error(error, context.as_deref()).await
            }
        }
    }

    pub async fn notify_user_registered(
        &self,
        user_id: &str,
        name: &str,
        role: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::UserRegistered,
            Priority::Low,
            "New user registered",
            format!("{} joined the platform as {}", name, role),
            format!("/admin/users/{}", user_id),
            Some((user_id, "user")),
        ))
        .await
    }

    pub async fn notify_job_posted(
        &self,
        job_id: &str,
        title: &str,
        company: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::JobPosted,
            Priority::Medium,
            "New job posted",
            format!("{} posted \"{}\"", company, title),
            format!("/admin/jobs/{}", job_id),
            Some((job_id, "job")),
        ))
        .await
    }

    pub async fn notify_course_published(
        &self,
        course_id: &str,
        title: &str,
        instructor: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::CoursePublished,
            Priority::Medium,
            "New course published",
            format!("{} published \"{}\"", instructor, title),
            format!("/admin/courses/{}", course_id),
            Some((course_id, "course")),
        ))
        .await
    }

    pub async fn notify_review_flagged(
        &self,
        review_id: &str,
        reason: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::ReviewFlagged,
            Priority::High,
            "Review flagged",
            format!("A review was flagged: {}", reason),
            format!("/admin/reviews/{}", review_id),
            Some((review_id, "review")),
        ))
        .await
    }

    pub async fn notify_content_reported(
        &self,
        content_type: &str,
        content_id: &str,
        reason: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::ContentReported,
            Priority::High,
            "Content reported",
            format!("A {} was reported: {}", content_type, reason),
            format!("/admin/content/{}/{}", content_type, content_id),
            Some((content_id, content_type)),
        ))
        .await
    }

    pub async fn notify_suspicious_activity(
        &self,
        user_id: &str,
        description: &str,
    ) -> Result<Vec<AdminNotification>, AppError> {
        self.create(&event_params(
            AdminNotificationType::SuspiciousActivity,
            Priority::Urgent,
            "Suspicious activity detected",
            description.to_string(),
            format!("/admin/users/{}", user_id),
            Some((user_id, "user")),
        ))
        .await
    }

    pub async fn notify_system_error(
        &self,
        error: &str,
        context: Option<&str>,
    ) -> Result<Vec<AdminNotification>, AppError> {
        let message = match context {
            Some(context) => format!("{} ({})", error, context),
            None => error.to_string(),
        };
        self.create(&event_params(
            AdminNotificationType::SystemError,
            Priority::Urgent,
            "System error",
            message,
            "/admin/logs".to_string(),
            None,
        ))
        .await
    }
}

fn event_params(
    notification_type: AdminNotificationType,
    priority: Priority,
    title: &str,
    message: String,
    action_url: String,
    related: Option<(&str, &str)>,
) -> CreateAdminNotificationParams {
    CreateAdminNotificationParams {
        target: AdminTarget::All,
        notification_type,
        priority,
        title: title.to_string(),
        message,
        action_url: Some(action_url),
        related_id: related.map(|(id, _)| id.to_string()),
        related_type: related.map(|(_, kind)| kind.to_string()),
    }
}
