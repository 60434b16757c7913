use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::{
    error::ApiResult,
    extractors::ValidatedJson,
    middlewares::auth::AuthUser,
    models::user::{ChangePasswordRequest, LoginRequest, RegisterRequest},
    services::{auth_service::AuthService, AppState},
};

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = AuthService::new(state.mongo.clone(), &state.jwt)
        .register(req)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = AuthService::new(state.mongo.clone(), &state.jwt)
        .login(req)
        .await?;
    Ok(Json(response))
}

/// GET /api/auth/me
pub async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let profile = AuthService::new(state.mongo.clone(), &state.jwt)
        .profile(&user.id)
        .await?;
    Ok(Json(json!({ "success": true, "user": profile })))
}

/// GET /api/auth/profile
pub async fn profile(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let profile = AuthService::new(state.mongo.clone(), &state.jwt)
        .profile(&user.id)
        .await?;
    Ok(Json(profile))
}

/// PUT /api/auth/change-password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    AuthService::new(state.mongo.clone(), &state.jwt)
        .change_password(&user.id, req)
        .await?;
    Ok(Json(json!({ "message": "Password updated successfully" })))
}
