//! Preference service: per-user type settings, quiet hours, digest frequency
//! and registered push endpoints.
//!
//! A user has one preference row holding two type-setting maps (user and admin
//! notification types). Rows are created with defaults on first read.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::quiet_hours::{QuietHours, parse_clock_time};
use careerak_common::types::{
    AdminNotificationType, AdminTypeSettings, Frequency, FrequencySettings,
    NotificationPreference, NotificationType, PushSubscription, TypeSetting, TypeSettingUpdate,
    UserTypeSettings,
};

/// Service layer for notification preferences.
pub struct PreferenceService;

/// Which type-setting map an operation applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceScope {
    #[default]
    User,
    Admin,
}

/// A notification type together with the map it lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    User(NotificationType),
    Admin(AdminNotificationType),
}

impl NotificationKind {
    /// Parse a type name within a scope. Unknown names are a validation error.
    pub fn parse(scope: PreferenceScope, raw: &str) -> Result<Self, AppError> {
        match scope {
            PreferenceScope::User => raw.parse().map(NotificationKind::User),
            PreferenceScope::Admin => raw.parse().map(NotificationKind::Admin),
        }
    }
}

/// Partial replacement of a preference row; omitted sections are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePreferencesParams {
    pub preferences: Option<UserTypeSettings>,
    pub admin_preferences: Option<AdminTypeSettings>,
    pub quiet_hours: Option<QuietHoursUpdate>,
    pub frequency: Option<FrequencyUpdate>,
}

/// Quiet-hours change. Times are `H:MM` or `HH:MM`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuietHoursUpdate {
    pub enabled: Option<bool>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl QuietHoursUpdate {
    /// Validate both times before touching `quiet`, so a bad `end` leaves it unchanged.
    pub fn apply(&self, quiet: &mut QuietHours) -> Result<(), AppError> {
        let start = Self::parse_bound(self.start.as_deref(), "start")?;
        let end = Self::parse_bound(self.end.as_deref(), "end")?;

        if let Some(enabled) = self.enabled {
            quiet.enabled = enabled;
        }
        if let Some(start) = start {
            quiet.start = start;
        }
        if let Some(end) = end {
            quiet.end = end;
        }
        Ok(())
    }

    fn parse_bound(raw: Option<&str>, which: &str) -> Result<Option<NaiveTime>, AppError> {
        raw.map(|raw| {
            parse_clock_time(raw).ok_or_else(|| {
                AppError::Validation(format!("Invalid {} time format. Use HH:MM", which))
            })
        })
        .transpose()
    }
}

/// Per-category frequency change.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FrequencyUpdate {
    pub recommendations: Option<Frequency>,
    pub applications: Option<Frequency>,
    pub system: Option<Frequency>,
}

impl FrequencyUpdate {
    pub fn apply(&self, frequency: &mut FrequencySettings) {
        if let Some(f) = self.recommendations {
            frequency.recommendations = f;
        }
        if let Some(f) = self.applications {
            frequency.applications = f;
        }
        if let Some(f) = self.system {
            frequency.system = f;
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Registration payload sent by a browser's push manager.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSubscriptionParams {
    pub endpoint: String,
    pub keys: Option<PushKeys>,
    pub user_agent: Option<String>,
}

/// Enabled/total counts for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScopeSummary {
    pub enabled: usize,
    pub total: usize,
    pub percentage: u32,
}

impl ScopeSummary {
    fn from_flags(flags: impl Iterator<Item = bool>) -> Self {
        let (enabled, total) = flags.fold((0, 0), |(on, all), f| (on + usize::from(f), all + 1));
        let percentage = if total == 0 {
            0
        } else {
            ((enabled as f64 / total as f64) * 100.0).round() as u32
        };
        Self {
            enabled,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceSummary {
    pub user: ScopeSummary,
    pub admin: ScopeSummary,
    pub quiet_hours: bool,
    pub frequency: FrequencySettings,
    pub push_subscriptions: i64,
}

impl PreferenceService {
    /// Read-only lookup; `None` when the user has never stored preferences.
    pub async fn find(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreference>, AppError> {
        let prefs = sqlx::query_as("SELECT * FROM notification_preferences WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(prefs)
    }

    /// Load preferences, creating the default row on first access.
    pub async fn get(pool: &PgPool, user_id: Uuid) -> Result<NotificationPreference, AppError> {
        if let Some(prefs) = Self::find(pool, user_id).await? {
            return Ok(prefs);
        }

        let defaults = NotificationPreference::defaults(user_id);

        // A concurrent first read may have inserted already; the no-op update
        // makes RETURNING yield that row.
        let prefs: NotificationPreference = sqlx::query_as(
            r#"
            INSERT INTO notification_preferences
                (user_id, preferences, admin_preferences, quiet_hours, frequency)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&defaults.preferences)
        .bind(&defaults.admin_preferences)
        .bind(&defaults.quiet_hours)
        .bind(&defaults.frequency)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::missing_reference(e, "User"))?;

        tracing::info!(user_id = %user_id, "Default notification preferences created");

        Ok(prefs)
    }

    async fn save(
        pool: &PgPool,
        prefs: &NotificationPreference,
    ) -> Result<NotificationPreference, AppError> {
        let saved = sqlx::query_as(
            r#"
            UPDATE notification_preferences
            SET preferences = $2, admin_preferences = $3, quiet_hours = $4, frequency = $5,
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(prefs.user_id)
        .bind(&prefs.preferences)
        .bind(&prefs.admin_preferences)
        .bind(&prefs.quiet_hours)
        .bind(&prefs.frequency)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification preferences not found".to_string()))?;

        Ok(saved)
    }

    /// Replace the provided sections of a user's preferences.
    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        params: &UpdatePreferencesParams,
    ) -> Result<NotificationPreference, AppError> {
        let mut prefs = Self::get(pool, user_id).await?;
        apply_update(&mut prefs, params)?;
        let prefs = Self::save(pool, &prefs).await?;

        tracing::info!(user_id = %user_id, "Notification preferences updated");
        Ok(prefs)
    }

    /// Merge flags into a single type's setting.
    pub async fn update_notification_type(
        pool: &PgPool,
        user_id: Uuid,
        kind: NotificationKind,
        update: &TypeSettingUpdate,
    ) -> Result<NotificationPreference, AppError> {
        let mut prefs = Self::get(pool, user_id).await?;
        let setting = apply_type_update(&mut prefs, kind, update);
        let prefs = Self::save(pool, &prefs).await?;

        tracing::info!(
            user_id = %user_id,
            kind = ?kind,
            enabled = setting.enabled,
            push = setting.push,
            email = setting.email,
            "Notification type setting updated"
        );
        Ok(prefs)
    }

    /// Whether a type is enabled. Missing rows, missing entries and storage
    /// errors all count as enabled.
    pub async fn is_notification_enabled(
        pool: &PgPool,
        user_id: Uuid,
        kind: NotificationKind,
    ) -> bool {
        match Self::find(pool, user_id).await {
            Ok(Some(prefs)) => kind_enabled(&prefs, kind),
            Ok(None) => true,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Preference lookup failed, assuming enabled");
                true
            }
        }
    }

    /// Whether the user's quiet hours cover `now`. Storage errors count as not quiet.
    pub async fn is_quiet_hours(pool: &PgPool, user_id: Uuid, now: NaiveTime) -> bool {
        match Self::find(pool, user_id).await {
            Ok(Some(prefs)) => prefs.quiet_hours.is_active_at(now),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Quiet hours lookup failed, assuming not quiet");
                false
            }
        }
    }

    pub async fn update_quiet_hours(
        pool: &PgPool,
        user_id: Uuid,
        update: &QuietHoursUpdate,
    ) -> Result<QuietHours, AppError> {
        let mut prefs = Self::get(pool, user_id).await?;
        update.apply(&mut prefs.quiet_hours)?;
        let prefs = Self::save(pool, &prefs).await?;

        tracing::info!(
            user_id = %user_id,
            enabled = prefs.quiet_hours.enabled,
            "Quiet hours updated"
        );
        Ok(prefs.quiet_hours.0)
    }

    pub async fn enable_all(
        pool: &PgPool,
        user_id: Uuid,
        scope: PreferenceScope,
    ) -> Result<NotificationPreference, AppError> {
        Self::set_all(pool, user_id, scope, true).await
    }

    pub async fn disable_all(
        pool: &PgPool,
        user_id: Uuid,
        scope: PreferenceScope,
    ) -> Result<NotificationPreference, AppError> {
        Self::set_all(pool, user_id, scope, false).await
    }

    async fn set_all(
        pool: &PgPool,
        user_id: Uuid,
        scope: PreferenceScope,
        enabled: bool,
    ) -> Result<NotificationPreference, AppError> {
        let mut prefs = Self::get(pool, user_id).await?;
        set_all_enabled(&mut prefs, scope, enabled);
        let prefs = Self::save(pool, &prefs).await?;

        tracing::info!(user_id = %user_id, scope = ?scope, enabled, "All notification types toggled");
        Ok(prefs)
    }

    pub async fn get_frequency(pool: &PgPool, user_id: Uuid) -> Result<FrequencySettings, AppError> {
        Ok(Self::get(pool, user_id).await?.frequency.0)
    }

    pub async fn update_frequency(
        pool: &PgPool,
        user_id: Uuid,
        update: &FrequencyUpdate,
    ) -> Result<FrequencySettings, AppError> {
        let mut prefs = Self::get(pool, user_id).await?;
        update.apply(&mut prefs.frequency);
        let prefs = Self::save(pool, &prefs).await?;

        tracing::info!(user_id = %user_id, frequency = ?prefs.frequency.0, "Digest frequency updated");
        Ok(prefs.frequency.0)
    }

    /// Register a push endpoint. Re-registering an endpoint refreshes its keys.
    pub async fn add_push_subscription(
        pool: &PgPool,
        user_id: Uuid,
        params: &PushSubscriptionParams,
    ) -> Result<PushSubscription, AppError> {
        let endpoint = params.endpoint.trim();
        if endpoint.is_empty() {
            return Err(AppError::Validation("Push endpoint is required".to_string()));
        }

        let (p256dh, auth) = match &params.keys {
            Some(keys) => (Some(keys.p256dh.as_str()), Some(keys.auth.as_str())),
            None => (None, None),
        };

        let sub: PushSubscription = sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, endpoint) DO UPDATE
            SET p256dh = EXCLUDED.p256dh, auth = EXCLUDED.auth,
                user_agent = EXCLUDED.user_agent, subscribed_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .bind(params.user_agent.as_deref())
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::missing_reference(e, "User"))?;

        tracing::info!(user_id = %user_id, subscription_id = %sub.id, "Push subscription registered");
        Ok(sub)
    }

    /// Remove a push endpoint. Returns true if it existed.
    pub async fn remove_push_subscription(
        pool: &PgPool,
        user_id: Uuid,
        endpoint: &str,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
            .bind(user_id)
            .bind(endpoint)
            .execute(pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            tracing::info!(user_id = %user_id, "Push subscription removed");
        }
        Ok(removed)
    }

    pub async fn list_push_subscriptions(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<PushSubscription>, AppError> {
        let subs = sqlx::query_as(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 ORDER BY subscribed_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(subs)
    }

    async fn count_push_subscriptions(pool: &PgPool, user_id: Uuid) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM push_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    /// Delete the preference row and every push endpoint. Returns true if a row existed.
    pub async fn delete(pool: &PgPool, user_id: Uuid) -> Result<bool, AppError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM notification_preferences WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            tracing::info!(user_id = %user_id, "Notification preferences deleted");
        }
        Ok(deleted)
    }

    pub async fn summary(pool: &PgPool, user_id: Uuid) -> Result<PreferenceSummary, AppError> {
        let prefs = Self::get(pool, user_id).await?;
        let push_subscriptions = Self::count_push_subscriptions(pool, user_id).await?;
        Ok(summarize(&prefs, push_subscriptions))
    }
}

fn kind_enabled(prefs: &NotificationPreference, kind: NotificationKind) -> bool {
    match kind {
        NotificationKind::User(t) => prefs.user_setting(t).enabled,
        NotificationKind::Admin(t) => prefs.admin_enabled(t),
    }
}

fn apply_update(
    prefs: &mut NotificationPreference,
    params: &UpdatePreferencesParams,
) -> Result<(), AppError> {
    // Quiet hours first: it is the only fallible section.
    if let Some(quiet) = &params.quiet_hours {
        quiet.apply(&mut prefs.quiet_hours)?;
    }
    if let Some(user) = &params.preferences {
        prefs.preferences = Json(user.clone());
    }
    if let Some(admin) = &params.admin_preferences {
        prefs.admin_preferences = Json(admin.clone());
    }
    if let Some(frequency) = &params.frequency {
        frequency.apply(&mut prefs.frequency);
    }
    Ok(())
}

fn apply_type_update(
    prefs: &mut NotificationPreference,
    kind: NotificationKind,
    update: &TypeSettingUpdate,
) -> TypeSetting {
    let setting = match kind {
        NotificationKind::User(t) => prefs.preferences.entry(t).or_default(),
        NotificationKind::Admin(t) => prefs.admin_preferences.entry(t).or_default(),
    };
    update.apply(setting);
    *setting
}

fn set_all_enabled(prefs: &mut NotificationPreference, scope: PreferenceScope, enabled: bool) {
    match scope {
        PreferenceScope::User => {
            for t in NotificationType::ALL {
                prefs.preferences.entry(*t).or_default().enabled = enabled;
            }
        }
        PreferenceScope::Admin => {
            for t in AdminNotificationType::ALL {
                prefs.admin_preferences.entry(*t).or_default().enabled = enabled;
            }
        }
    }
}

fn summarize(prefs: &NotificationPreference, push_subscriptions: i64) -> PreferenceSummary {
    PreferenceSummary {
        user: ScopeSummary::from_flags(
            NotificationType::ALL
                .iter()
                .map(|t| prefs.user_setting(*t).enabled),
        ),
        admin: ScopeSummary::from_flags(
            AdminNotificationType::ALL
                .iter()
                .map(|t| prefs.admin_enabled(*t)),
        ),
        quiet_hours: prefs.quiet_hours.enabled,
        frequency: prefs.frequency.0,
        push_subscriptions,
    }
}
