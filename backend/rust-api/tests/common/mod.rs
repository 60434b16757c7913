#![allow(dead_code)]

use axum::{
    body::{Body, Bytes},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use lms_api::{
    config::{LogFormat, RateLimitConfig},
    create_router,
    middlewares::auth::JwtService,
    models::user::UserRole,
    AppState, Config,
};
use mongodb::bson::oid::ObjectId;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";
pub const TEST_METRICS_AUTH: &str = "prom:scrape-secret";

/// Set to a reachable server to run the database-backed flows
pub const MONGO_URI_VAR: &str = "LMS_TEST_MONGO_URI";

pub fn test_config(mongo_uri: &str, database: &str) -> Config {
    Config {
        environment: "test".to_string(),
        port: 0,
        mongo_uri: mongo_uri.to_string(),
        mongo_database: database.to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_ttl_seconds: 3600,
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        rate_limit: RateLimitConfig {
            max_requests: 10_000,
            window_seconds: 60,
        },
        admin_seed_file: None,
        metrics_auth: TEST_METRICS_AUTH.to_string(),
        otlp_endpoint: None,
        log_format: LogFormat::Pretty,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Router over a client that never connects; only routes that fail before
/// touching the database are meaningful against it
pub async fn create_offline_app() -> Router {
    create_offline_app_with(offline_config()).await
}

/// Nothing listens here and serverSelectionTimeoutMS keeps stray queries short
pub fn offline_config() -> Config {
    test_config(
        "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200",
        "lms_offline",
    )
}

pub async fn create_offline_app_with(config: Config) -> Router {
    init_tracing();
    let client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to parse offline MongoDB URI");
    create_router(Arc::new(AppState::new(config, client)))
}

pub struct LiveApp {
    pub router: Router,
    pub database: mongodb::Database,
}

impl LiveApp {
    pub async fn cleanup(self) {
        let _ = self.database.drop().await;
    }
}

/// Router over a fresh, uniquely named database; None when no server is configured
pub async fn create_live_app() -> Option<LiveApp> {
    let uri = std::env::var(MONGO_URI_VAR).ok()?;
    init_tracing();

    let database = format!("lms_test_{}", uuid::Uuid::new_v4().simple());
    let config = test_config(&uri, &database);
    let client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to test MongoDB");
    let db = client.database(&database);
    lms_api::services::seed::ensure_indexes(&db).await;

    Some(LiveApp {
        router: create_router(Arc::new(AppState::new(config, client))),
        database: db,
    })
}

pub fn token_for(id: &ObjectId, role: UserRole) -> String {
    JwtService::new(TEST_JWT_SECRET, 3600)
        .issue(id, role)
        .expect("Failed to issue test token")
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Status plus parsed JSON body
pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send(app, method, uri, token, body).await;
    let status = response.status();
    (status, body_json(response).await)
}
