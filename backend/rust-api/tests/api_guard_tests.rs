// Request guards that resolve before any database access
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use lms_api::models::user::UserRole;
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{
    call, create_offline_app, create_offline_app_with, offline_config, send, token_for,
    TEST_METRICS_AUTH,
};

#[tokio::test]
async fn test_protected_routes_require_token() {
    let app = create_offline_app().await;

    for (method, uri) in [
        ("GET", "/api/auth/me"),
        ("GET", "/api/users"),
        ("POST", "/api/courses"),
        ("GET", "/api/assignments"),
        ("GET", "/api/notifications"),
        ("PUT", "/api/notifications/read-all"),
    ] {
        let (status, body) = call(&app, method, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
        assert_eq!(body["message"], "No token, authorization denied");
    }
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = create_offline_app().await;

    let (status, body) = call(&app, "GET", "/api/auth/me", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token is not valid");

    let foreign = lms_api::middlewares::auth::JwtService::new("some-other-secret", 3600)
        .issue(&ObjectId::new(), UserRole::Admin)
        .unwrap();
    let (status, _) = call(&app, "GET", "/api/users", Some(&foreign), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_guards() {
    let app = create_offline_app().await;
    let student = token_for(&ObjectId::new(), UserRole::Student);
    let instructor = token_for(&ObjectId::new(), UserRole::Instructor);

    let (status, body) = call(&app, "GET", "/api/users", Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "User role student is not authorized to access this route"
    );

    let (status, _) = call(&app, "GET", "/api/users/stats/overview", Some(&instructor), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let course = json!({
        "title": "Rust",
        "description": "Systems programming",
        "category": "Programming",
        "level": "Beginner",
        "duration": { "weeks": 4, "hoursPerWeek": 3 },
        "maxStudents": 20
    });
    let (status, _) = call(&app, "POST", "/api/courses", Some(&student), Some(course)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let uri = format!("/api/assignments/{}/submit", ObjectId::new().to_hex());
    let (status, _) = call(&app, "POST", &uri, Some(&instructor), Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_students_cannot_read_other_profiles() {
    let app = create_offline_app().await;
    let student = token_for(&ObjectId::new(), UserRole::Student);

    let uri = format!("/api/users/{}", ObjectId::new().to_hex());
    let (status, body) = call(&app, "GET", &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");
}

#[tokio::test]
async fn test_invalid_object_id() {
    let app = create_offline_app().await;
    let admin = token_for(&ObjectId::new(), UserRole::Admin);

    let (status, body) = call(&app, "GET", "/api/users/not-an-id", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid user id: must be ObjectId");

    let (status, _) = call(&app, "PUT", "/api/notifications/xyz/read", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_validation_errors() {
    let app = create_offline_app().await;

    let (status, body) = call(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "email": "not-an-email",
            "password": "123",
            "firstName": "Ada",
            "lastName": " "
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Validation failed");
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["email", "last_name", "password"]);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let app = create_offline_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"email\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::body_json(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Invalid JSON body"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .body(Body::from("email=a"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = create_offline_app().await;

    let (status, body) = call(&app, "GET", "/api/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Route not found");
}

#[tokio::test]
async fn test_service_info() {
    let app = create_offline_app().await;

    let (status, body) = call(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "LMS API Server");
    assert_eq!(body["mode"], "API Only");
}

#[tokio::test]
async fn test_health_reports_unreachable_database() {
    let app = create_offline_app().await;

    let (status, body) = call(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "DEGRADED");
    assert_eq!(body["database"], "unreachable");
}

#[tokio::test]
async fn test_security_and_trace_headers() {
    let app = create_offline_app().await;

    let response = send(&app, "GET", "/", None, None).await;
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("content-security-policy"));
    assert!(!headers["x-trace-id"].is_empty());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/")
                .header("x-trace-id", "client-trace_01")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.headers()["x-trace-id"], "client-trace_01");
}

#[tokio::test]
async fn test_metrics_require_basic_auth() {
    let app = create_offline_app().await;

    let response = send(&app, "GET", "/metrics", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let scrape = |credentials: &str| {
        Request::builder()
            .uri("/metrics")
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", general_purpose::STANDARD.encode(credentials)),
            )
            .body(Body::empty())
            .unwrap()
    };

    // the built-in dev credentials are not accepted once configured
    let response = app.clone().oneshot(scrape("admin:changeme")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.clone().oneshot(scrape(TEST_METRICS_AUTH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(common::body_bytes(response).await.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
}

#[tokio::test]
async fn test_bad_query_string_returns_json_error() {
    let app = create_offline_app().await;
    let admin = token_for(&ObjectId::new(), UserRole::Admin);

    for uri in [
        "/api/users?page=abc",
        "/api/courses?limit=-x",
        "/api/assignments?page=first",
        "/api/notifications?limit=many",
    ] {
        let response = send(&app, "GET", uri, Some(&admin), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json",
            "{}",
            uri
        );
        let body = common::body_json(response).await;
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .starts_with("Invalid query string"),
            "{}: {}",
            uri,
            body
        );
    }
}

#[tokio::test]
async fn test_submit_accepts_missing_body() {
    let app = create_offline_app().await;
    let student = token_for(&ObjectId::new(), UserRole::Student);

    // The body is accepted, so the id check is the first thing to fail
    let (status, body) = call(&app, "POST", "/api/assignments/not-an-id/submit", Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid assignment id: must be ObjectId");

    // A real id gets past extraction and only fails on the unreachable database
    let uri = format!("/api/assignments/{}/submit", ObjectId::new().to_hex());
    let (status, _) = call(&app, "POST", &uri, Some(&student), None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_admin_cannot_delete_own_account() {
    let app = create_offline_app().await;
    let admin_id = ObjectId::new();
    let admin = token_for(&admin_id, UserRole::Admin);

    let uri = format!("/api/users/{}", admin_id.to_hex());
    let (status, body) = call(&app, "DELETE", &uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You cannot delete your own account");
}

#[tokio::test]
async fn test_rate_limit_covers_whole_app() {
    let mut config = offline_config();
    config.rate_limit.max_requests = 2;
    let app = create_offline_app_with(config).await;

    let (status, _) = call(&app, "GET", "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "GET", "/api/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = send(&app, "GET", "/", None, None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}
