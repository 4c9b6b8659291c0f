//! Access control: static API key and client address whitelist.

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlpanel::error::PanelError;
use std::sync::Arc;

use crate::config::SecurityConfig;
use crate::middleware::{request_address, ApiError};
use crate::GatewayState;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Check the `X-API-Key` header against the configured key.
pub fn validate_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), PanelError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let supplied = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if supplied.is_empty() {
        return Err(PanelError::Unauthorized("API key is required".to_string()));
    }
    if supplied != expected {
        return Err(PanelError::Forbidden("Invalid API key".to_string()));
    }
    Ok(())
}

pub fn check_ip_whitelist(address: &str, whitelist: &[String]) -> Result<(), PanelError> {
    if whitelist.is_empty() || whitelist.iter().any(|allowed| allowed == address) {
        Ok(())
    } else {
        Err(PanelError::Forbidden("Access denied from your IP address".to_string()))
    }
}

fn authorize<B>(request: &Request<B>, security: &SecurityConfig) -> Result<(), PanelError> {
    validate_api_key(request.headers(), security.api_key.as_deref())?;
    check_ip_whitelist(&request_address(request, security.trust_forwarded_for), &security.ip_whitelist)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match authorize(&request, &state.config.security) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            let client = request_address(&request, state.config.security.trust_forwarded_for);
            tracing::warn!(client = %client, "Rejected: {}", e);
            ApiError::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_key() {
        let mut headers = HeaderMap::new();
        assert!(validate_api_key(&headers, None).is_ok());

        let err = validate_api_key(&headers, Some("k")).unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "API key is required");

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("nope"));
        assert_eq!(validate_api_key(&headers, Some("k")).unwrap_err().status_code(), 403);

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("k"));
        assert!(validate_api_key(&headers, Some("k")).is_ok());
    }

    #[test]
    fn test_ip_whitelist() {
        assert!(check_ip_whitelist("1.2.3.4", &[]).is_ok());
        let list = vec!["127.0.0.1".to_string()];
        assert!(check_ip_whitelist("127.0.0.1", &list).is_ok());
        assert_eq!(check_ip_whitelist("1.2.3.4", &list).unwrap_err().status_code(), 403);
    }
}
