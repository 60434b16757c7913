use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiResult,
    extractors::AppQuery,
    middlewares::auth::AuthUser,
    models::notification::{ListNotificationsQuery, NotificationMessageResponse},
    services::{notification_service::NotificationService, AppState},
};

/// GET /api/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    AppQuery(query): AppQuery<ListNotificationsQuery>,
) -> ApiResult<impl IntoResponse> {
    let notifications = NotificationService::new(state.mongo.clone())
        .list(&caller.id, query)
        .await?;
    Ok(Json(notifications))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let notification = NotificationService::new(state.mongo.clone())
        .mark_read(&caller.id, &id)
        .await?;
    Ok(Json(NotificationMessageResponse {
        message: "Notification marked as read".to_string(),
        notification,
    }))
}

pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let response = NotificationService::new(state.mongo.clone())
        .mark_all_read(&caller.id)
        .await?;
    Ok(Json(response))
}

pub async fn delete_notification(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    NotificationService::new(state.mongo.clone())
        .delete(&caller.id, &id)
        .await?;
    Ok(Json(json!({ "message": "Notification deleted" })))
}
