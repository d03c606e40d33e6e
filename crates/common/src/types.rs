use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::error::AppError;
use crate::quiet_hours::QuietHours;

/// Declares a fieldless enum stored as `text` and exchanged as its snake_case name.
///
/// Generates `ALL`, `as_str`, `Display` and a `FromStr` that reports the valid
/// values on failure.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(rename_all = "snake_case")]
        #[sqlx(type_name = "text", rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| {
                        let valid: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        AppError::Validation(format!(
                            "Invalid {} '{}'. Valid values: {}",
                            $label,
                            s,
                            valid.join(", ")
                        ))
                    })
            }
        }
    };
}

text_enum! {
    /// Platform role of a user.
    Role ("role") {
        Admin => "admin",
        Moderator => "moderator",
        JobSeeker => "job_seeker",
        Company => "company",
        Freelancer => "freelancer",
    }
}

impl Role {
    /// Admins and moderators receive admin notifications.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Moderator)
    }
}

text_enum! {
    /// Notification priority, ordered from least to most important.
    Priority ("priority") {
        Low => "low",
        Medium => "medium",
        High => "high",
        /// Bypasses quiet hours.
        Urgent => "urgent",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

text_enum! {
    /// Platform events reported to admins and moderators.
    AdminNotificationType ("admin notification type") {
        UserRegistered => "user_registered",
        JobPosted => "job_posted",
        CoursePublished => "course_published",
        ReviewFlagged => "review_flagged",
        ContentReported => "content_reported",
        SuspiciousActivity => "suspicious_activity",
        SystemError => "system_error",
    }
}

text_enum! {
    /// Notifications sent to regular users.
    NotificationType ("notification type") {
        JobMatch => "job_match",
        ApplicationAccepted => "application_accepted",
        ApplicationRejected => "application_rejected",
        ApplicationReviewed => "application_reviewed",
        NewApplication => "new_application",
        JobClosed => "job_closed",
        CourseMatch => "course_match",
        CandidateMatch => "candidate_match",
        RecommendationUpdate => "recommendation_update",
        NewDeviceLogin => "new_device_login",
        System => "system",
        /// Batched summary produced by the digest runner.
        Digest => "digest",
    }
}

impl NotificationType {
    /// Frequency category this type is batched under.
    pub fn category(&self) -> NotificationCategory {
        match self {
            NotificationType::JobMatch
            | NotificationType::CourseMatch
            | NotificationType::CandidateMatch
            | NotificationType::RecommendationUpdate => NotificationCategory::Recommendations,
            NotificationType::ApplicationAccepted
            | NotificationType::ApplicationRejected
            | NotificationType::ApplicationReviewed
            | NotificationType::NewApplication
            | NotificationType::JobClosed => NotificationCategory::Applications,
            NotificationType::NewDeviceLogin
            | NotificationType::System
            | NotificationType::Digest => NotificationCategory::System,
        }
    }
}

text_enum! {
    /// Groups of user notification types sharing a delivery frequency.
    NotificationCategory ("notification category") {
        Recommendations => "recommendations",
        Applications => "applications",
        System => "system",
    }
}

text_enum! {
    /// How often a category is delivered.
    Frequency ("frequency") {
        Instant => "instant",
        Hourly => "hourly",
        Daily => "daily",
        Weekly => "weekly",
        Disabled => "disabled",
    }
}

impl Frequency {
    /// Frequencies handled by the digest scheduler.
    pub const BATCHED: &'static [Frequency] =
        &[Frequency::Hourly, Frequency::Daily, Frequency::Weekly];

    pub fn is_batched(&self) -> bool {
        Self::BATCHED.contains(self)
    }
}

/// Whether and how a notification type is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeSetting {
    pub enabled: bool,
    pub push: bool,
    pub email: bool,
}

impl Default for TypeSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            push: true,
            email: false,
        }
    }
}

/// Partial update of a [`TypeSetting`]; omitted flags are left untouched.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TypeSettingUpdate {
    pub enabled: Option<bool>,
    pub push: Option<bool>,
    pub email: Option<bool>,
}

impl TypeSettingUpdate {
    pub fn apply(&self, setting: &mut TypeSetting) {
        if let Some(enabled) = self.enabled {
            setting.enabled = enabled;
        }
        if let Some(push) = self.push {
            setting.push = push;
        }
        if let Some(email) = self.email {
            setting.email = email;
        }
    }
}

/// Per-category delivery frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencySettings {
    pub recommendations: Frequency,
    pub applications: Frequency,
    pub system: Frequency,
}

impl Default for FrequencySettings {
    fn default() -> Self {
        Self {
            recommendations: Frequency::Daily,
            applications: Frequency::Instant,
            system: Frequency::Instant,
        }
    }
}

impl FrequencySettings {
    pub fn for_category(&self, category: NotificationCategory) -> Frequency {
        match category {
            NotificationCategory::Recommendations => self.recommendations,
            NotificationCategory::Applications => self.applications,
            NotificationCategory::System => self.system,
        }
    }
}

pub type UserTypeSettings = BTreeMap<NotificationType, TypeSetting>;
pub type AdminTypeSettings = BTreeMap<AdminNotificationType, TypeSetting>;

/// A user's stored notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationPreference {
    pub user_id: Uuid,
    pub preferences: Json<UserTypeSettings>,
    pub admin_preferences: Json<AdminTypeSettings>,
    pub quiet_hours: Json<QuietHours>,
    pub frequency: Json<FrequencySettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreference {
    /// Default preferences: every type enabled with push, quiet hours off.
    pub fn defaults(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            preferences: Json(
                NotificationType::ALL
                    .iter()
                    .map(|t| (*t, TypeSetting::default()))
                    .collect(),
            ),
            admin_preferences: Json(
                AdminNotificationType::ALL
                    .iter()
                    .map(|t| (*t, TypeSetting::default()))
                    .collect(),
            ),
            quiet_hours: Json(QuietHours::default()),
            frequency: Json(FrequencySettings::default()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Effective setting for a user type; a missing entry counts as the default.
    pub fn user_setting(&self, notification_type: NotificationType) -> TypeSetting {
        self.preferences
            .get(&notification_type)
            .copied()
            .unwrap_or_default()
    }

    /// Whether an admin type is enabled; a missing entry counts as enabled.
    pub fn admin_enabled(&self, notification_type: AdminNotificationType) -> bool {
        self.admin_preferences
            .get(&notification_type)
            .is_none_or(|s| s.enabled)
    }
}

/// A registered Web Push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub p256dh: Option<String>,
    pub auth: Option<String>,
    pub user_agent: Option<String>,
    pub subscribed_at: DateTime<Utc>,
}

/// A platform user, as far as notifications are concerned.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// A persisted alert for one admin or moderator.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AdminNotification {
    pub id: Uuid,
    pub admin_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: AdminNotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub related_id: Option<String>,
    pub related_type: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// A persisted notification for a regular user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub related_data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub push_sent: bool,
    pub email_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// A user notification waiting for its digest.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DigestItem {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub frequency: Frequency,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub related_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub digested_at: Option<DateTime<Utc>>,
}

/// Page metadata returned alongside list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamp a requested page/limit pair to valid values.
    pub fn clamp(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
        let page = page.unwrap_or(1).max(1);
        let limit = limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        (page, limit)
    }

    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }

    /// Row offset for SQL `OFFSET`.
    pub fn offset(page: u32, limit: u32) -> i64 {
        i64::from(page.saturating_sub(1)) * i64::from(limit)
    }
}
