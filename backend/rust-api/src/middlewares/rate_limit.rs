use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::services::AppState;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct WindowTable {
    windows: HashMap<String, Window>,
    /// Expired windows are swept at most once per window length
    last_prune: Instant,
}

/// Fixed-window request counter keyed by client
pub struct RateLimiter {
    table: Mutex<WindowTable>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            table: Mutex::new(WindowTable {
                windows: HashMap::new(),
                last_prune: Instant::now(),
            }),
            max_requests: config.max_requests,
            window: Duration::from_secs(config.window_seconds),
        }
    }

    pub async fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now()).await
    }

    pub async fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        let mut table = self.table.lock().await;

        if now.saturating_duration_since(table.last_prune) >= self.window {
            let span = self.window;
            table
                .windows
                .retain(|_, w| now.saturating_duration_since(w.started) < span);
            table.last_prune = now;
        }

        let entry = table.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            let elapsed = now.saturating_duration_since(entry.started);
            return RateDecision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.table.lock().await.windows.len()
    }
}

pub fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // X-Forwarded-For, Forwarded, X-Real-IP, then the socket address
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            if let Some(first) = s.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return first.to_string();
            }
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            // forwarded: for=1.2.3.4; proto=http; by=...
            for part in s.split([';', ',']) {
                let p = part.trim();
                if let Some(value) = p.strip_prefix("for=") {
                    return value.trim().trim_matches('"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip_from(request.headers(), request.extensions());

    match state.rate_limiter.check(&client_ip).await {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            tracing::warn!(client_ip = %client_ip, "Rate limit exceeded");
            let mut response = ApiError::TooManyRequests.into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.as_secs().max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Extensions;

    fn limiter(max_requests: u32, window_seconds: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            max_requests,
            window_seconds,
        })
    }

    #[tokio::test]
    async fn test_limits_within_window() {
        let limiter = limiter(2, 60);
        let now = Instant::now();
        assert_eq!(
            limiter.check_at("1.1.1.1", now).await,
            RateDecision::Allowed { remaining: 1 }
        );
        assert_eq!(
            limiter.check_at("1.1.1.1", now).await,
            RateDecision::Allowed { remaining: 0 }
        );
        assert!(matches!(
            limiter.check_at("1.1.1.1", now + Duration::from_secs(10)).await,
            RateDecision::Limited { retry_after } if retry_after == Duration::from_secs(50)
        ));
        // other clients are independent
        assert!(matches!(
            limiter.check_at("2.2.2.2", now).await,
            RateDecision::Allowed { .. }
        ));
    }

    #[tokio::test]
    async fn test_window_resets() {
        let limiter = limiter(1, 60);
        let now = Instant::now();
        assert!(matches!(
            limiter.check_at("ip", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("ip", now).await,
            RateDecision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check_at("ip", now + Duration::from_secs(60)).await,
            RateDecision::Allowed { remaining: 0 }
        ));
    }

    #[tokio::test]
    async fn test_stale_windows_are_pruned_once_per_window() {
        let limiter = limiter(5, 60);
        let start = Instant::now();
        for i in 0..50 {
            limiter.check_at(&format!("client-{}", i), start).await;
        }
        assert_eq!(limiter.tracked_clients().await, 50);

        // nothing is swept before a full window has passed
        limiter
            .check_at("fresh", start + Duration::from_secs(30))
            .await;
        assert_eq!(limiter.tracked_clients().await, 51);

        // the sweep keeps windows that are still open
        limiter
            .check_at("late", start + Duration::from_secs(75))
            .await;
        assert_eq!(limiter.tracked_clients().await, 2);
    }

    #[tokio::test]
    async fn test_live_clients_do_not_trigger_repeated_sweeps() {
        let limiter = limiter(1000, 60);
        let start = Instant::now();
        limiter.check_at("a", start + Duration::from_secs(60)).await;
        let swept_at = limiter.table.lock().await.last_prune;

        limiter.check_at("b", start + Duration::from_secs(61)).await;
        limiter.check_at("c", start + Duration::from_secs(90)).await;
        assert_eq!(limiter.table.lock().await.last_prune, swept_at);
        assert_eq!(limiter.tracked_clients().await, 3);
    }

    #[test]
    fn test_extract_client_ip_precedence() {
        let extensions = Extensions::new();

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "9.9.9.9".parse().unwrap());
        headers.insert("forwarded", "for=\"8.8.8.8\";proto=https".parse().unwrap());
        headers.insert("x-forwarded-for", "7.7.7.7, 10.0.0.1".parse().unwrap());
        assert_eq!(extract_client_ip_from(&headers, &extensions), "7.7.7.7");

        headers.remove("x-forwarded-for");
        assert_eq!(extract_client_ip_from(&headers, &extensions), "8.8.8.8");

        headers.remove("forwarded");
        assert_eq!(extract_client_ip_from(&headers, &extensions), "9.9.9.9");

        assert_eq!(
            extract_client_ip_from(&HeaderMap::new(), &extensions),
            "unknown"
        );
    }

    #[test]
    fn test_extract_client_ip_from_socket() {
        let mut extensions = Extensions::new();
        extensions.insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 5001))));
        assert_eq!(
            extract_client_ip_from(&HeaderMap::new(), &extensions),
            "127.0.0.1"
        );
    }
}
