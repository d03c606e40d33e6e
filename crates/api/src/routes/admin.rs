//! Staff routes: admin notification inbox, event ingest and digest runs.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::{AdminNotification, Frequency};
use careerak_engine::admin::{AdminEvent, AdminNotificationFilter, AdminNotificationPage};
use careerak_engine::digest::DigestRunReport;
use careerak_engine::notifications::{
    CreateOutcome, JobMatchFanOut, JobMatchRequest, UserEventRequest,
};

use crate::middleware::auth::StaffUser;
use crate::routes::preferences;
use crate::state::AppState;

const BASE: &str = "/api/admin/notifications";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/notifications", get(list_notifications))
        .route("/api/admin/notifications/unread-count", get(unread_count))
        .route("/api/admin/notifications/mark-all-read", patch(mark_all_read))
        .route("/api/admin/notifications/{id}/read", patch(mark_read))
        .route("/api/admin/notifications/{id}", delete(delete_notification))
        .route("/api/admin/events", post(ingest_event))
        .route("/api/admin/user-notifications", post(ingest_user_event))
        .route("/api/admin/job-matches", post(notify_job_matches))
        .route("/api/admin/digests/{frequency}/run", post(run_digest))
        .merge(preferences::router::<StaffUser>(BASE))
}

/// GET /api/admin/notifications: filtered, newest-first page.
async fn list_notifications(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
    Query(filter): Query<AdminNotificationFilter>,
) -> Result<Json<AdminNotificationPage>, AppError> {
    let page = state
        .admin_notifications
        .list(auth.user_id, &filter)
        .await?;
    Ok(Json(page))
}

async fn unread_count(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.admin_notifications.unread_count(auth.user_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let modified = state
        .admin_notifications
        .mark_all_as_read(auth.user_id)
        .await?;
    Ok(Json(json!({ "modified": modified })))
}

async fn mark_read(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AdminNotification>, AppError> {
    let notification = state
        .admin_notifications
        .mark_as_read(id, auth.user_id)
        .await?;
    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.admin_notifications.delete(id, auth.user_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// POST /api/admin/events: fan a platform event out to every admin.
async fn ingest_event(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
    Json(event): Json<AdminEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    let created = state.admin_notifications.handle_event(&event).await?;
    tracing::debug!(submitted_by = %auth.user_id, created = created.len(), "Admin event ingested");
    Ok(Json(json!({
        "created": created.len(),
        "notifications": created,
    })))
}

/// POST /api/admin/user-notifications: route a user-facing event.
async fn ingest_user_event(
    State(state): State<AppState>,
    StaffUser(_auth): StaffUser,
    Json(request): Json<UserEventRequest>,
) -> Result<Json<CreateOutcome>, AppError> {
    let outcome = state.notifications.handle_event(request).await?;
    Ok(Json(outcome))
}

/// POST /api/admin/job-matches: announce a new job to its matching users.
async fn notify_job_matches(
    State(state): State<AppState>,
    StaffUser(_auth): StaffUser,
    Json(request): Json<JobMatchRequest>,
) -> Json<JobMatchFanOut> {
    Json(state.notifications.notify_matching_users(&request).await)
}

/// POST /api/admin/digests/{frequency}/run: run the current period now.
async fn run_digest(
    State(state): State<AppState>,
    StaffUser(auth): StaffUser,
    Path(frequency): Path<String>,
) -> Result<Json<DigestRunReport>, AppError> {
    let frequency: Frequency = frequency.parse()?;
    let mut redis = state.redis.clone();
    let report = state
        .digests
        .run_now(&mut redis, frequency, Utc::now())
        .await?;

    tracing::info!(
        triggered_by = %auth.user_id,
        period_key = %report.period_key,
        "Manual digest run"
    );
    Ok(Json(report))
}
