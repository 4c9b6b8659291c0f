//! Rate limiting and structured error responses.

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlpanel::error::PanelError;
use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::GatewayState;

/// Length of the rate-limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter keyed by client address.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed per window; 0 disables
    limit: u32,
    window: Duration,
    hits: RwLock<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: RwLock::new(HashMap::new()),
        }
    }

    /// Record a request for `key`. Returns the remaining allowance, or `Err`
    /// when the window is already full (the rejected request is not counted).
    pub async fn check(&self, key: &str) -> Result<u32, ()> {
        if self.limit == 0 {
            return Ok(u32::MAX);
        }

        let now = Instant::now();
        let mut hits = self.hits.write().await;
        let times = hits.entry(key.to_string()).or_default();

        while times.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            times.pop_front();
        }

        if times.len() as u32 >= self.limit {
            return Err(());
        }
        times.push_back(now);
        Ok(self.limit - times.len() as u32)
    }

    /// Drop clients with no requests inside the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut hits = self.hits.write().await;
        hits.retain(|_, times| times.back().is_some_and(|t| now.duration_since(*t) < self.window));
    }
}

/// Client address: the peer address, or the first `X-Forwarded-For` entry
/// when the gateway sits behind a trusted proxy.
pub fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    let forwarded = trust_forwarded_for
        .then(|| headers.get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    forwarded
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub(crate) fn request_address<B>(request: &Request<B>, trust_forwarded_for: bool) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    client_address(request.headers(), peer, trust_forwarded_for)
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let key = request_address(&request, state.config.security.trust_forwarded_for);

    match state.limiter.check(&key).await {
        Ok(remaining) => {
            let mut response = next.run(request).await;
            if state.config.security.rate_limit_per_minute > 0 {
                response
                    .headers_mut()
                    .insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            }
            response
        }
        Err(()) => {
            tracing::warn!("Rate limited: {}", key);
            ApiError::from(PanelError::RateLimited).into_response()
        }
    }
}

/// `{ "success": false, "message": ... }` with the matching status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl From<PanelError> for ApiError {
    fn from(err: PanelError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "success": false, "message": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter() {
        let limiter = RateLimiter::new(3);

        assert_eq!(limiter.check("a").await, Ok(2));
        assert_eq!(limiter.check("a").await, Ok(1));
        assert_eq!(limiter.check("a").await, Ok(0));
        assert!(limiter.check("a").await.is_err(), "fourth request should fail");

        // Different key has its own window
        assert!(limiter.check("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(20));
        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_err());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(limiter.check("a").await.is_ok());

        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.cleanup().await;
        assert!(limiter.hits.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_zero_disables() {
        let limiter = RateLimiter::new(0);
        for _ in 0..100 {
            assert!(limiter.check("a").await.is_ok());
        }
    }

    #[test]
    fn test_client_address() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        assert_eq!(client_address(&headers, Some(peer), false), "10.1.1.1");
        assert_eq!(client_address(&headers, None, false), "unknown");

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
        assert_eq!(client_address(&headers, Some(peer), false), "10.1.1.1");
        assert_eq!(client_address(&headers, None, false), "unknown");
        assert_eq!(client_address(&headers, Some(peer), true), "203.0.113.9");
    }

    #[test]
    fn test_api_error_status() {
        let err = ApiError::from(PanelError::invalid("bad"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(PanelError::RateLimited).status, StatusCode::TOO_MANY_REQUESTS);
    }
}
