use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// JSON request bodies are capped at 10 MB
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Something went wrong!" })),
    )
        .into_response()
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(AnyOrigin);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/auth", auth_routes(app_state.clone()))
        .nest("/users", user_routes(app_state.clone()))
        .nest("/courses", course_routes(app_state.clone()))
        .nest("/assignments", assignment_routes(app_state.clone()))
        .nest("/notifications", notification_routes(app_state.clone()));

    let cors = cors_layer(&app_state.config.cors_allowed_origins);

    Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health_check))
        // Prometheus scrape, HTTP Basic auth
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    handlers::metrics_auth_middleware,
                )),
        )
        .nest("/api", api)
        .fallback(handlers::route_not_found)
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::rate_limit::rate_limit_middleware,
        ))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(middleware::from_fn(
            middlewares::security::security_headers_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    trace_id = tracing::field::Empty,
                )
            }),
        )
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
}

fn auth_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    let public_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        .route("/me", get(handlers::auth::me))
        .route("/profile", get(handlers::auth::profile))
        .route("/change-password", put(handlers::auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn user_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/stats/overview", get(handlers::users::user_stats))
        .route(
            "/{id}",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route(
            "/{id}/enroll/{course_id}",
            post(handlers::users::enroll_user),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn course_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public reads; a valid token widens what is visible
    let public_routes = Router::new()
        .route("/", get(handlers::courses::list_courses))
        .route("/{id}", get(handlers::courses::get_course))
        .route(
            "/instructor/{instructor_id}",
            get(handlers::courses::instructor_courses),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            middlewares::auth::optional_auth_middleware,
        ));

    let protected_routes = Router::new()
        .route("/", post(handlers::courses::create_course))
        .route(
            "/{id}",
            put(handlers::courses::update_course).delete(handlers::courses::delete_course),
        )
        .route("/{id}/enroll", post(handlers::courses::enroll))
        .route("/{id}/unenroll", post(handlers::courses::unenroll))
        .route("/{id}/publish", post(handlers::courses::toggle_publish))
        .route("/{id}/progress", put(handlers::courses::update_progress))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn assignment_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::assignments::list_assignments)
                .post(handlers::assignments::create_assignment),
        )
        .route(
            "/{id}",
            get(handlers::assignments::get_assignment)
                .put(handlers::assignments::update_assignment)
                .delete(handlers::assignments::delete_assignment),
        )
        .route(
            "/{id}/publish",
            post(handlers::assignments::toggle_publish),
        )
        .route("/{id}/submit", post(handlers::assignments::submit))
        .route(
            "/{id}/submissions",
            get(handlers::assignments::list_submissions),
        )
        .route(
            "/{id}/grade/{submission_id}",
            post(handlers::assignments::grade_submission),
        )
        .route(
            "/{id}/submissions/{submission_id}/grade",
            put(handlers::assignments::grade_submission),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}

fn notification_routes(app_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::notifications::list_notifications))
        .route("/read-all", put(handlers::notifications::mark_all_read))
        .route(
            "/{id}",
            delete(handlers::notifications::delete_notification),
        )
        .route("/{id}/read", put(handlers::notifications::mark_read))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ))
}
