use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::metrics;
use crate::services::AppState;

pub mod assignments;
pub mod auth;
pub mod courses;
pub mod notifications;
pub mod users;

const DB_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// GET /health, GET /api/health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database = match tokio::time::timeout(
        DB_PING_TIMEOUT,
        state.mongo.run_command(mongodb::bson::doc! { "ping": 1 }),
    )
    .await
    {
        Ok(Ok(_)) => "connected",
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "MongoDB ping failed");
            "unreachable"
        }
        Err(_) => {
            tracing::warn!("MongoDB ping timed out after 1s");
            "unreachable"
        }
    };

    let (status_code, status, message) = if database == "connected" {
        (StatusCode::OK, "OK", "LMS API is running")
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "DEGRADED",
            "LMS API is running but the database is unreachable",
        )
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
            "environment": state.config.environment,
            "database": database,
        })),
    )
}

/// GET / - service banner with the route map
pub async fn service_info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "message": "LMS API Server",
        "mode": "API Only",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "endpoints": [
            "/api/health",
            "/api/auth",
            "/api/users",
            "/api/courses",
            "/api/assignments",
            "/api/notifications",
        ],
    }))
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("Route not found")
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

/// True when `value` is a Basic authorization header carrying `expected` (`user:pass`)
pub fn basic_credentials_match(value: &str, expected: &str) -> bool {
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .is_some_and(|credentials| credentials == expected)
}

/// Protects /metrics with HTTP Basic auth from `Config::metrics_auth`
pub async fn metrics_auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !basic_credentials_match(auth_header, &state.config.metrics_auth) {
        tracing::warn!("Rejected metrics scrape with bad credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_credentials() {
        let header = format!("Basic {}", general_purpose::STANDARD.encode("prom:secret"));
        assert!(basic_credentials_match(&header, "prom:secret"));
        assert!(!basic_credentials_match(&header, "prom:other"));
        assert!(!basic_credentials_match("Bearer abc", "prom:secret"));
        assert!(!basic_credentials_match("Basic !!!", "prom:secret"));
    }
}
