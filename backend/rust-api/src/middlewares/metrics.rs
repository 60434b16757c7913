use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per normalized route
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(duration);

    response
}

/// Collapses dynamic segments so label cardinality stays bounded
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_object_id(segment) || is_uuid_like(segment) || is_numeric_id(segment) {
                "{id}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// MongoDB ObjectId: 24 hex characters
fn is_object_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_uuid_like(s: &str) -> bool {
    s.len() == 36 && s.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/courses/507f1f77bcf86cd799439011/enroll"),
            "/api/courses/{id}/enroll"
        );
        assert_eq!(
            normalize_path(
                "/api/assignments/507f1f77bcf86cd799439011/grade/507f191e810c19729de860ea"
            ),
            "/api/assignments/{id}/grade/{id}"
        );
        assert_eq!(
            normalize_path("/api/things/550e8400-e29b-41d4-a716-446655440000"),
            "/api/things/{id}"
        );
        assert_eq!(normalize_path("/api/users/stats/overview"), "/api/users/stats/overview");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_is_object_id() {
        assert!(is_object_id("507f1f77bcf86cd799439011"));
        assert!(!is_object_id("507f1f77bcf86cd79943901z"));
        assert!(!is_object_id("instructor"));
    }

    #[test]
    fn test_is_numeric_id() {
        assert!(is_numeric_id("123"));
        assert!(!is_numeric_id("abc"));
        assert!(!is_numeric_id(""));
    }
}
