//! User notifications.
//!
//! Every notification is routed through the recipient's preferences: disabled
//! types and categories are dropped, batched categories go to the digest
//! queue, and the rest are stored and delivered immediately. Non-urgent instant
//! notifications that arrive during quiet hours wait for the hourly digest.

use std::collections::HashSet;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::{
    DigestItem, Frequency, Notification, NotificationPreference, NotificationType, Pagination,
    Priority, TypeSetting,
};
use careerak_notifier::NotificationDispatcher;

use crate::digest::DigestQueue;
use crate::preferences::PreferenceService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationParams {
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    pub title: String,
    pub message: String,
    #[serde(default = "empty_object")]
    pub related_data: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    TypeDisabled,
    FrequencyDisabled,
}

/// Where a new notification goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Drop(DropReason),
    Digest(Frequency),
    Instant(TypeSetting),
}

/// Route a notification according to the recipient's preferences.
pub fn route(
    prefs: &NotificationPreference,
    notification_type: NotificationType,
    priority: Priority,
    now: NaiveTime,
) -> Route {
    let setting = prefs.user_setting(notification_type);
    if !setting.enabled {
        return Route::Drop(DropReason::TypeDisabled);
    }

    match prefs.frequency.for_category(notification_type.category()) {
        Frequency::Disabled => Route::Drop(DropReason::FrequencyDisabled),
        Frequency::Instant => {
            if priority != Priority::Urgent && prefs.quiet_hours.is_active_at(now) {
                Route::Digest(Frequency::Hourly)
            } else {
                Route::Instant(setting)
            }
        }
        batched => Route::Digest(batched),
    }
}

/// Result of [`UserNotificationService::create`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreateOutcome {
    Delivered { notification: Notification },
    Queued { item: DigestItem },
    Dropped { reason: DropReason },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub pagination: Pagination,
    pub unread_count: i64,
}

/// Platform events that produce user notifications.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UserEvent {
    JobMatch {
        job_id: String,
        job_title: String,
        company: String,
    },
    ApplicationAccepted {
        application_id: String,
        job_title: String,
    },
    ApplicationRejected {
        application_id: String,
        job_title: String,
    },
    ApplicationReviewed {
        application_id: String,
        job_title: String,
    },
    NewApplication {
        application_id: String,
        job_title: String,
        applicant_name: String,
    },
    CandidateMatch {
        candidate_id: String,
        candidate_name: String,
        job_title: String,
    },
    NewDeviceLogin {
        device: String,
        location: Option<String>,
    },
    JobClosed {
        job_id: String,
        job_title: String,
    },
    CourseMatch {
        course_id: String,
        course_title: String,
    },
    System {
        title: String,
        message: String,
        #[serde(default)]
        priority: Priority,
    },
    RecommendationUpdate(RecommendationUpdate),
}

/// Changes to a user's job recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "update", rename_all = "snake_case")]
pub enum RecommendationUpdate {
    NewRecommendations { count: u32 },
    ProfileUpdated,
    /// Sent as a high-priority job match rather than a recommendation update.
    HighMatchFound { job_id: String, match_score: u8 },
}

/// A user event addressed to one recipient.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEventRequest {
    pub recipient_id: Uuid,
    #[serde(flatten)]
    pub event: UserEvent,
}

impl UserEvent {
    /// Build the notification this event produces for `recipient_id`.
    pub fn into_params(self, recipient_id: Uuid) -> CreateNotificationParams {
        use serde_json::json;

        let (notification_type, priority, title, message, related_data) = match self {
            UserEvent::JobMatch {
                job_id,
                job_title,
                company,
            } => (
                NotificationType::JobMatch,
                Priority::Medium,
                "New job match".to_string(),
                format!("\"{}\" at {} matches your profile", job_title, company),
                json!({ "job_id": job_id }),
            ),
            UserEvent::ApplicationAccepted {
                application_id,
                job_title,
            } => (
                NotificationType::ApplicationAccepted,
                Priority::Urgent,
                "Application accepted".to_string(),
                format!("Your application for \"{}\" was accepted", job_title),
                json!({ "application_id": application_id }),
            ),
            UserEvent::ApplicationRejected {
                application_id,
                job_title,
            } => (
                NotificationType::ApplicationRejected,
                Priority::Medium,
                "Application update".to_string(),
                format!("Your application for \"{}\" was not selected", job_title),
                json!({ "application_id": application_id }),
            ),
            UserEvent::ApplicationReviewed {
                application_id,
                job_title,
            } => (
                NotificationType::ApplicationReviewed,
                Priority::Medium,
                "Application reviewed".to_string(),
                format!("Your application for \"{}\" is being reviewed", job_title),
                json!({ "application_id": application_id }),
            ),
            UserEvent::NewApplication {
                application_id,
                job_title,
                applicant_name,
            } => (
                NotificationType::NewApplication,
                Priority::High,
                "New application".to_string(),
                format!("{} applied for \"{}\"", applicant_name, job_title),
                json!({ "application_id": application_id }),
            ),
            UserEvent::CandidateMatch {
                candidate_id,
                candidate_name,
                job_title,
            } => (
                NotificationType::CandidateMatch,
                Priority::High,
                "New candidate match".to_string(),
                format!("{} matches your job \"{}\"", candidate_name, job_title),
                json!({ "candidate_id": candidate_id }),
            ),
            UserEvent::NewDeviceLogin { device, location } => {
                let message = match &location {
                    Some(location) => format!("New sign-in from {} near {}", device, location),
                    None => format!("New sign-in from {}", device),
                };
                (
                    NotificationType::NewDeviceLogin,
                    Priority::Urgent,
                    "New device login".to_string(),
                    message,
                    json!({ "device": device, "location": location }),
                )
            }
            UserEvent::JobClosed { job_id, job_title } => (
                NotificationType::JobClosed,
                Priority::Medium,
                "Job closed".to_string(),
                format!("\"{}\" is no longer accepting applications", job_title),
                json!({ "job_id": job_id }),
            ),
            UserEvent::CourseMatch {
                course_id,
                course_title,
            } => (
                NotificationType::CourseMatch,
                Priority::Medium,
                "Recommended course".to_string(),
                format!("\"{}\" matches your skills", course_title),
                json!({ "course_id": course_id }),
            ),
            UserEvent::System {
                title,
                message,
                priority,
            } => (NotificationType::System, priority, title, message, json!({})),
            UserEvent::RecommendationUpdate(RecommendationUpdate::NewRecommendations { count }) => (
                NotificationType::RecommendationUpdate,
                Priority::Medium,
                "New recommendations available".to_string(),
                format!("You have {} new job recommendations based on your profile", count),
                json!({ "count": count }),
            ),
            UserEvent::RecommendationUpdate(RecommendationUpdate::ProfileUpdated) => (
                NotificationType::RecommendationUpdate,
                Priority::Medium,
                "Recommendations updated".to_string(),
                "Your job recommendations were refreshed after your profile changed".to_string(),
                json!({}),
            ),
            UserEvent::RecommendationUpdate(RecommendationUpdate::HighMatchFound {
                job_id,
                match_score,
            }) => (
                NotificationType::JobMatch,
                Priority::High,
                "High match found".to_string(),
                format!("We found a job that matches {}% of your skills", match_score),
                json!({ "job_id": job_id, "match_score": match_score }),
            ),
        };

        CreateNotificationParams {
            recipient_id,
            notification_type,
            priority,
            title,
            message,
            related_data,
        }
    }
}

/// A new job announced to every user whose profile matched it.
#[derive(Debug, Clone, Deserialize)]
pub struct JobMatchRequest {
    pub recipient_ids: Vec<Uuid>,
    pub job_id: String,
    pub job_title: String,
    pub company: String,
}

/// Totals for a job-match fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobMatchFanOut {
    /// Distinct recipients considered.
    pub matching: usize,
    /// Delivered now or queued for a digest.
    pub notified: usize,
    pub dropped: usize,
    pub failed: usize,
}

impl JobMatchFanOut {
    fn record(&mut self, outcome: &Result<CreateOutcome, AppError>) {
        self.matching += 1;
        match outcome {
            Ok(CreateOutcome::Delivered { .. }) | Ok(CreateOutcome::Queued { .. }) => {
                self.notified += 1
            }
            Ok(CreateOutcome::Dropped { .. }) => self.dropped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Address for the email channel. A failed lookup skips email rather than
/// failing a notification that is already stored.
fn email_or_skip(
    notification_id: Uuid,
    lookup: Result<Option<String>, AppError>,
) -> Option<String> {
    lookup.unwrap_or_else(|e| {
        tracing::warn!(
            notification_id = %notification_id,
            error = %e,
            "Recipient email lookup failed, skipping email"
        );
        None
    })
}

/// Insert a notification row.
pub async fn insert_notification<'e, E: PgExecutor<'e>>(
    executor: E,
    params: &CreateNotificationParams,
) -> Result<Notification, AppError> {
    let notification = sqlx::query_as(
        r#"
        INSERT INTO notifications (id, recipient_id, type, priority, title, message, related_data)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(params.recipient_id)
    .bind(params.notification_type.as_str())
    .bind(params.priority.as_str())
    .bind(&params.title)
    .bind(&params.message)
    .bind(&params.related_data)
    .fetch_one(executor)
    .await
    .map_err(|e| AppError::missing_reference(e, "User"))?;

    Ok(notification)
}

/// Service layer for user notifications.
#[derive(Clone)]
pub struct UserNotificationService {
    pool: PgPool,
    dispatcher: NotificationDispatcher,
}

impl UserNotificationService {
    pub fn new(pool: PgPool, dispatcher: NotificationDispatcher) -> Self {
        Self { pool, dispatcher }
    }

    pub async fn create(
        &self,
        params: &CreateNotificationParams,
    ) -> Result<CreateOutcome, AppError> {
        self.create_at(params, crate::local_wall_clock()).await
    }

    /// [`create`](Self::create) with an explicit wall-clock time for quiet hours.
    pub async fn create_at(
        &self,
        params: &CreateNotificationParams,
        now: NaiveTime,
    ) -> Result<CreateOutcome, AppError> {
        let prefs = PreferenceService::get(&self.pool, params.recipient_id).await?;

        match route(&prefs, params.notification_type, params.priority, now) {
            Route::Drop(reason) => {
                tracing::info!(
                    recipient_id = %params.recipient_id,
                    notification_type = %params.notification_type,
                    reason = ?reason,
                    "Notification dropped"
                );
                Ok(CreateOutcome::Dropped { reason })
            }
            Route::Digest(frequency) => {
                let item = DigestQueue::enqueue(&self.pool, params, frequency).await?;
                Ok(CreateOutcome::Queued { item })
            }
            Route::Instant(setting) => {
                let notification = insert_notification(&self.pool, params).await?;
                let notification = self.deliver(notification, setting).await;
                Ok(CreateOutcome::Delivered { notification })
            }
        }
    }

    pub async fn handle_event(&self, request: UserEventRequest) -> Result<CreateOutcome, AppError> {
        let params = request.event.into_params(request.recipient_id);
        self.create(&params).await
    }

    /// Send a stored notification over its channels and record which succeeded.
    /// The row is already stored, so failures here are logged and never returned.
    pub(crate) async fn deliver(
        &self,
        notification: Notification,
        setting: TypeSetting,
    ) -> Notification {
        let email_to = if setting.email && self.dispatcher.email.is_enabled() {
            email_or_skip(
                notification.id,
                self.recipient_email(notification.recipient_id).await,
            )
        } else {
            None
        };

        let outcome = self
            .dispatcher
            .deliver_user(&notification, setting, email_to.as_deref())
            .await;

        tracing::info!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            push_sent = outcome.push_sent,
            email_sent = outcome.email_sent,
            "Notification delivered"
        );

        if !outcome.push_sent && !outcome.email_sent {
            return notification;
        }

        let updated = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET push_sent = $2, email_sent = $3 WHERE id = $1 RETURNING *",
        )
        .bind(notification.id)
        .bind(outcome.push_sent)
        .bind(outcome.email_sent)
        .fetch_one(&self.pool)
        .await;

        match updated {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to record delivery flags"
                );
                Notification {
                    push_sent: outcome.push_sent,
                    email_sent: outcome.email_sent,
                    ..notification
                }
            }
        }
    }

    async fn recipient_email(&self, user_id: Uuid) -> Result<Option<String>, AppError> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(email.flatten())
    }

    /// Newest-first page of a user's notifications.
    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &NotificationFilter,
    ) -> Result<NotificationPage, AppError> {
        let (page, limit) = Pagination::clamp(filter.page, filter.limit);

        let notifications: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(filter.unread_only)
        .bind(i64::from(limit))
        .bind(Pagination::offset(page, limit))
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND (NOT $2 OR NOT is_read)",
        )
        .bind(user_id)
        .bind(filter.unread_only)
        .fetch_one(&self.pool)
        .await?;

        let unread_count = self.unread_count(user_id).await?;

        Ok(NotificationPage {
            notifications,
            pagination: Pagination::new(page, limit, total.max(0) as u64),
            unread_count,
        })
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_read",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn mark_as_read(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND recipient_id = $2
            RETURNING *
            "#,
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        Ok(notification)
    }

    pub async fn mark_all_as_read(&self, user_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = NOW()
            WHERE recipient_id = $1 AND NOT is_read
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let modified = result.rows_affected();
        tracing::info!(user_id = %user_id, modified, "Notifications marked read");
        Ok(modified)
    }

    pub async fn delete(
        &self,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as(
            "DELETE FROM notifications WHERE id = $1 AND recipient_id = $2 RETURNING *",
        )
        .bind(notification_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        Ok(notification)
    }

    pub async fn notify_job_match(
        &self,
        user_id: Uuid,
        job_id: &str,
        job_title: &str,
        company: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::JobMatch {
                job_id: job_id.to_string(),
                job_title: job_title.to_string(),
                company: company.to_string(),
            },
        )
        .await
    }

    pub async fn notify_application_accepted(
        &self,
        user_id: Uuid,
        application_id: &str,
        job_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::ApplicationAccepted {
                application_id: application_id.to_string(),
                job_title: job_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_application_rejected(
        &self,
        user_id: Uuid,
        application_id: &str,
        job_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::ApplicationRejected {
                application_id: application_id.to_string(),
                job_title: job_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_application_reviewed(
        &self,
        user_id: Uuid,
        application_id: &str,
        job_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::ApplicationReviewed {
                application_id: application_id.to_string(),
                job_title: job_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_new_application(
        &self,
        company_user_id: Uuid,
        application_id: &str,
        job_title: &str,
        applicant_name: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            company_user_id,
            UserEvent::NewApplication {
                application_id: application_id.to_string(),
                job_title: job_title.to_string(),
                applicant_name: applicant_name.to_string(),
            },
        )
        .await
    }

    pub async fn notify_candidate_match(
        &self,
        company_user_id: Uuid,
        candidate_id: &str,
        candidate_name: &str,
        job_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            company_user_id,
            UserEvent::CandidateMatch {
                candidate_id: candidate_id.to_string(),
                candidate_name: candidate_name.to_string(),
                job_title: job_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_new_device_login(
        &self,
        user_id: Uuid,
        device: &str,
        location: Option<&str>,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::NewDeviceLogin {
                device: device.to_string(),
                location: location.map(str::to_string),
            },
        )
        .await
    }

    pub async fn notify_job_closed(
        &self,
        user_id: Uuid,
        job_id: &str,
        job_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::JobClosed {
                job_id: job_id.to_string(),
                job_title: job_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_course_match(
        &self,
        user_id: Uuid,
        course_id: &str,
        course_title: &str,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::CourseMatch {
                course_id: course_id.to_string(),
                course_title: course_title.to_string(),
            },
        )
        .await
    }

    pub async fn notify_system(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        priority: Priority,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(
            user_id,
            UserEvent::System {
                title: title.to_string(),
                message: message.to_string(),
                priority,
            },
        )
        .await
    }

    pub async fn notify_recommendation_update(
        &self,
        user_id: Uuid,
        update: RecommendationUpdate,
    ) -> Result<CreateOutcome, AppError> {
        self.notify(user_id, UserEvent::RecommendationUpdate(update)).await
    }

    /// Send a job match to each recipient. A failure for one recipient is
    /// logged and counted, the rest still go out.
    pub async fn notify_matching_users(&self, request: &JobMatchRequest) -> JobMatchFanOut {
        let mut fan_out = JobMatchFanOut::default();
        let mut seen = HashSet::with_capacity(request.recipient_ids.len());

        for &user_id in &request.recipient_ids {
            if !seen.insert(user_id) {
                continue;
            }
            let outcome = self
                .notify_job_match(user_id, &request.job_id, &request.job_title, &request.company)
                .await;
            if let Err(e) = &outcome {
                tracing::warn!(
                    user_id = %user_id,
                    job_id = %request.job_id,
                    error = %e,
                    "Job match notification failed"
                );
            }
            fan_out.record(&outcome);
        }

        if fan_out.matching == 0 {
            tracing::info!(job_id = %request.job_id, "No matching users for job");
        } else {
            tracing::info!(
                job_id = %request.job_id,
                matching = fan_out.matching,
                notified = fan_out.notified,
                dropped = fan_out.dropped,
                failed = fan_out.failed,
                "Job match fan-out complete"
            );
        }

        fan_out
    }

    async fn notify(&self, user_id: Uuid, event: UserEvent) -> Result<CreateOutcome, AppError> {
        self.create(&event.into_params(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careerak_common::quiet_hours::{QuietHours, parse_clock_time};

    fn at(raw: &str) -> NaiveTime {
        parse_clock_time(raw).unwrap()
    }

    fn prefs() -> NotificationPreference {
        NotificationPreference::defaults(Uuid::new_v4())
    }

    fn with_quiet_hours(mut prefs: NotificationPreference) -> NotificationPreference {
        prefs.quiet_hours.0 = QuietHours {
            enabled: true,
            start: at("22:00"),
            end: at("07:00"),
        };
        prefs
    }

    #[test]
    fn test_instant_category_delivers_with_type_setting() {
        let route = route(
            &prefs(),
            NotificationType::ApplicationAccepted,
            Priority::Urgent,
            at("12:00"),
        );
        assert_eq!(route, Route::Instant(TypeSetting::default()));
    }

    #[test]
    fn test_recommendations_default_to_daily_digest() {
        assert_eq!(
            route(&prefs(), NotificationType::JobMatch, Priority::Medium, at("12:00")),
            Route::Digest(Frequency::Daily)
        );
    }

    #[test]
    fn test_disabled_type_is_dropped_before_frequency() {
        let mut p = prefs();
        p.preferences.entry(NotificationType::JobMatch).or_default().enabled = false;
        assert_eq!(
            route(&p, NotificationType::JobMatch, Priority::Urgent, at("12:00")),
            Route::Drop(DropReason::TypeDisabled)
        );
    }

    #[test]
    fn test_disabled_frequency_is_dropped() {
        let mut p = prefs();
        p.frequency.applications = Frequency::Disabled;
        assert_eq!(
            route(&p, NotificationType::JobClosed, Priority::Medium, at("12:00")),
            Route::Drop(DropReason::FrequencyDisabled)
        );
    }

    #[test]
    fn test_quiet_hours_defer_instant_to_hourly() {
        let p = with_quiet_hours(prefs());
        assert_eq!(
            route(&p, NotificationType::NewApplication, Priority::High, at("23:15")),
            Route::Digest(Frequency::Hourly)
        );
        assert!(matches!(
            route(&p, NotificationType::NewApplication, Priority::High, at("07:01")),
            Route::Instant(_)
        ));
    }

    #[test]
    fn test_urgent_bypasses_quiet_hours() {
        let p = with_quiet_hours(prefs());
        assert!(matches!(
            route(&p, NotificationType::NewDeviceLogin, Priority::Urgent, at("02:00")),
            Route::Instant(_)
        ));
    }

    #[test]
    fn test_quiet_hours_do_not_change_batched_frequency() {
        let mut p = with_quiet_hours(prefs());
        p.frequency.recommendations = Frequency::Weekly;
        assert_eq!(
            route(&p, NotificationType::CourseMatch, Priority::Low, at("23:00")),
            Route::Digest(Frequency::Weekly)
        );
    }

    #[test]
    fn test_user_event_builds_params() {
        let recipient = Uuid::new_v4();
        let params = UserEvent::ApplicationAccepted {
            application_id: "app-1".into(),
            job_title: "Backend Engineer".into(),
        }
        .into_params(recipient);
        assert_eq!(params.recipient_id, recipient);
        assert_eq!(params.notification_type, NotificationType::ApplicationAccepted);
        assert_eq!(params.priority, Priority::Urgent);
        assert_eq!(params.related_data["application_id"], "app-1");

        let params = UserEvent::NewDeviceLogin {
            device: "Firefox on Linux".into(),
            location: Some("Riyadh".into()),
        }
        .into_params(recipient);
        assert_eq!(params.message, "New sign-in from Firefox on Linux near Riyadh");
    }

    #[test]
    fn test_user_event_request_flattens_tag() {
        let request: UserEventRequest = serde_json::from_value(serde_json::json!({
            "recipient_id": "00000000-0000-0000-0000-000000000001",
            "event": "candidate_match",
            "candidate_id": "c-9",
            "candidate_name": "Sara",
            "job_title": "Data Analyst"
        }))
        .unwrap();
        let params = request.event.into_params(request.recipient_id);
        assert_eq!(params.notification_type, NotificationType::CandidateMatch);
        assert_eq!(params.priority, Priority::High);
    }

    #[test]
    fn test_recommendation_updates() {
        let recipient = Uuid::new_v4();
        let params = UserEvent::RecommendationUpdate(RecommendationUpdate::NewRecommendations {
            count: 4,
        })
        .into_params(recipient);
        assert_eq!(params.notification_type, NotificationType::RecommendationUpdate);
        assert_eq!(params.priority, Priority::Medium);
        assert_eq!(params.related_data["count"], 4);

        let params = UserEvent::RecommendationUpdate(RecommendationUpdate::ProfileUpdated)
            .into_params(recipient);
        assert_eq!(params.notification_type, NotificationType::RecommendationUpdate);

        // A high match goes out as a job match.
        let params = UserEvent::RecommendationUpdate(RecommendationUpdate::HighMatchFound {
            job_id: "job-7".into(),
            match_score: 92,
        })
        .into_params(recipient);
        assert_eq!(params.notification_type, NotificationType::JobMatch);
        assert_eq!(params.priority, Priority::High);
        assert!(params.message.contains("92%"));
        assert_eq!(params.related_data["job_id"], "job-7");
    }

    #[test]
    fn test_recommendation_update_request_parses() {
        let request: UserEventRequest = serde_json::from_value(serde_json::json!({
            "recipient_id": "00000000-0000-0000-0000-000000000002",
            "event": "recommendation_update",
            "update": "high_match_found",
            "job_id": "job-1",
            "match_score": 88
        }))
        .unwrap();
        assert_eq!(
            request.event,
            UserEvent::RecommendationUpdate(RecommendationUpdate::HighMatchFound {
                job_id: "job-1".into(),
                match_score: 88,
            })
        );
    }

    #[test]
    fn test_job_match_fan_out_counts() {
        let mut fan_out = JobMatchFanOut::default();
        fan_out.record(&Ok(CreateOutcome::Dropped {
            reason: DropReason::TypeDisabled,
        }));
        fan_out.record(&Err(AppError::Internal("boom".into())));
        assert_eq!(
            fan_out,
            JobMatchFanOut {
                matching: 2,
                notified: 0,
                dropped: 1,
                failed: 1,
            }
        );
    }

    #[test]
    fn test_failed_email_lookup_skips_email() {
        let id = Uuid::new_v4();
        assert_eq!(
            email_or_skip(id, Err(AppError::Internal("pool closed".into()))),
            None
        );
        assert_eq!(
            email_or_skip(id, Ok(Some("a@example.com".into()))).as_deref(),
            Some("a@example.com")
        );
    }

    #[test]
    fn test_outcome_serializes_status_tag() {
        let json = serde_json::to_value(CreateOutcome::Dropped {
            reason: DropReason::FrequencyDisabled,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "dropped", "reason": "frequency_disabled"})
        );
    }
}
