use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiResult,
    extractors::{AppQuery, ValidatedJson},
    middlewares::auth::AuthUser,
    models::user::{CreateUserRequest, ListUsersQuery, UpdateUserRequest, UserMessageResponse},
    services::{user_service::UserService, AppState},
};

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    AppQuery(query): AppQuery<ListUsersQuery>,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;
    Ok(Json(UserService::new(state.mongo.clone()).list(query).await?))
}

/// GET /api/users/stats/overview (admin)
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;
    Ok(Json(UserService::new(state.mongo.clone()).stats().await?))
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(
        UserService::new(state.mongo.clone()).get(&caller, &id).await?,
    ))
}

/// POST /api/users (admin)
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;
    let user = UserService::new(state.mongo.clone()).create(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(UserMessageResponse {
            message: "User created successfully".to_string(),
            user,
        }),
    ))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = UserService::new(state.mongo.clone())
        .update(&caller, &id, req)
        .await?;
    Ok(Json(UserMessageResponse {
        message: "User updated successfully".to_string(),
        user,
    }))
}

/// DELETE /api/users/{id} (admin)
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller.require_admin()?;
    UserService::new(state.mongo.clone())
        .delete(&caller, &id)
        .await?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

/// POST /api/users/{id}/enroll/{course_id}
pub async fn enroll_user(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path((id, course_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    UserService::new(state.mongo.clone())
        .enroll(&caller, &id, &course_id)
        .await?;
    Ok(Json(json!({ "message": "Successfully enrolled in course" })))
}
