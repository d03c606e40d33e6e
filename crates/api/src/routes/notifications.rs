//! User routes: notification inbox, digest frequency and push endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use careerak_common::error::AppError;
use careerak_common::types::{FrequencySettings, Notification, PushSubscription};
use careerak_engine::notifications::{NotificationFilter, NotificationPage};
use careerak_engine::preferences::{FrequencyUpdate, PreferenceService, PushSubscriptionParams};

use crate::middleware::auth::AuthUser;
use crate::routes::preferences;
use crate::state::AppState;

const BASE: &str = "/api/notifications";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/unread-count", get(unread_count))
        .route("/api/notifications/mark-all-read", patch(mark_all_read))
        .route("/api/notifications/{id}/read", patch(mark_read))
        .route("/api/notifications/{id}", delete(delete_notification))
        .route(
            "/api/notifications/frequency",
            get(get_frequency).put(update_frequency),
        )
        .route(
            "/api/notifications/push-subscriptions",
            get(list_push_subscriptions)
                .post(add_push_subscription)
                .delete(remove_push_subscription),
        )
        .merge(preferences::router::<AuthUser>(BASE))
}

#[derive(Debug, Deserialize)]
struct RemovePushSubscription {
    endpoint: String,
}

async fn list_notifications(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<NotificationPage>, AppError> {
    let page = state.notifications.list(auth.user_id, &filter).await?;
    Ok(Json(page))
}

async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let count = state.notifications.unread_count(auth.user_id).await?;
    Ok(Json(json!({ "unread_count": count })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let modified = state.notifications.mark_all_as_read(auth.user_id).await?;
    Ok(Json(json!({ "modified": modified })))
}

async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = state.notifications.mark_as_read(id, auth.user_id).await?;
    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.notifications.delete(id, auth.user_id).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// GET /api/notifications/frequency: delivery cadence per category.
async fn get_frequency(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<FrequencySettings>, AppError> {
    let frequency = PreferenceService::get_frequency(&state.pool, auth.user_id).await?;
    Ok(Json(frequency))
}

async fn update_frequency(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(update): Json<FrequencyUpdate>,
) -> Result<Json<FrequencySettings>, AppError> {
    let frequency = PreferenceService::update_frequency(&state.pool, auth.user_id, &update).await?;
    Ok(Json(frequency))
}

async fn list_push_subscriptions(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<PushSubscription>>, AppError> {
    let subs = PreferenceService::list_push_subscriptions(&state.pool, auth.user_id).await?;
    Ok(Json(subs))
}

/// POST /api/notifications/push-subscriptions: register (or refresh) an endpoint.
async fn add_push_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<PushSubscriptionParams>,
) -> Result<Json<PushSubscription>, AppError> {
    let sub = PreferenceService::add_push_subscription(&state.pool, auth.user_id, &params).await?;
    Ok(Json(sub))
}

async fn remove_push_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(params): Json<RemovePushSubscription>,
) -> Result<Json<serde_json::Value>, AppError> {
    let removed =
        PreferenceService::remove_push_subscription(&state.pool, auth.user_id, &params.endpoint)
            .await?;
    if removed {
        Ok(Json(json!({ "deleted": true })))
    } else {
        Err(AppError::NotFound("Push subscription not found".to_string()))
    }
}
