//! Preference routes, mounted once for users and once for staff.
//!
//! Handlers are generic over the extractor: `AuthUser` manages the user-type
//! map, `StaffUser` the admin-type map.

use axum::extract::{Path, State};
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};

use careerak_common::error::AppError;
use careerak_common::quiet_hours::QuietHours;
use careerak_common::types::{NotificationPreference, TypeSettingUpdate};
use careerak_engine::preferences::{
    NotificationKind, PreferenceService, PreferenceSummary, QuietHoursUpdate,
    UpdatePreferencesParams,
};

use crate::middleware::auth::ScopedUser;
use crate::state::AppState;

/// Preference routes under `base` (e.g. `/api/notifications`).
pub fn router<U: ScopedUser + 'static>(base: &str) -> Router<AppState> {
    Router::new()
        .route(
            &format!("{}/preferences", base),
            get(get_preferences::<U>).put(update_preferences::<U>),
        )
        .route(
            &format!("{}/preferences/quiet-hours", base),
            put(update_quiet_hours::<U>),
        )
        .route(
            &format!("{}/preferences/enable-all", base),
            post(enable_all::<U>),
        )
        .route(
            &format!("{}/preferences/disable-all", base),
            post(disable_all::<U>),
        )
        .route(
            &format!("{}/preferences/{{type}}", base),
            patch(update_type::<U>),
        )
        .route(&format!("{}/summary", base), get(summary::<U>))
}

/// GET {base}/preferences: Current preferences, created with defaults on first read.
async fn get_preferences<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
) -> Result<Json<NotificationPreference>, AppError> {
    let prefs = PreferenceService::get(&state.pool, user.user_id()).await?;
    Ok(Json(prefs))
}

/// PUT {base}/preferences: Replace the provided sections.
async fn update_preferences<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
    Json(params): Json<UpdatePreferencesParams>,
) -> Result<Json<NotificationPreference>, AppError> {
    let prefs = PreferenceService::update(&state.pool, user.user_id(), &params).await?;
    Ok(Json(prefs))
}

/// PATCH {base}/preferences/{type}: Merge flags into one type's setting.
async fn update_type<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
    Path(notification_type): Path<String>,
    Json(update): Json<TypeSettingUpdate>,
) -> Result<Json<NotificationPreference>, AppError> {
    let kind = NotificationKind::parse(U::SCOPE, &notification_type)?;
    let prefs =
        PreferenceService::update_notification_type(&state.pool, user.user_id(), kind, &update)
            .await?;
    Ok(Json(prefs))
}

/// PUT {base}/preferences/quiet-hours
async fn update_quiet_hours<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
    Json(update): Json<QuietHoursUpdate>,
) -> Result<Json<QuietHours>, AppError> {
    let quiet = PreferenceService::update_quiet_hours(&state.pool, user.user_id(), &update).await?;
    Ok(Json(quiet))
}

async fn enable_all<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
) -> Result<Json<NotificationPreference>, AppError> {
    let prefs = PreferenceService::enable_all(&state.pool, user.user_id(), U::SCOPE).await?;
    Ok(Json(prefs))
}

async fn disable_all<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
) -> Result<Json<NotificationPreference>, AppError> {
    let prefs = PreferenceService::disable_all(&state.pool, user.user_id(), U::SCOPE).await?;
    Ok(Json(prefs))
}

/// GET {base}/summary: Enabled counts per scope, quiet hours and push endpoints.
async fn summary<U: ScopedUser>(
    State(state): State<AppState>,
    user: U,
) -> Result<Json<PreferenceSummary>, AppError> {
    let summary = PreferenceService::summary(&state.pool, user.user_id()).await?;
    Ok(Json(summary))
}
