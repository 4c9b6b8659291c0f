//! HTTP router for the gateway.

use axum::{
    http::{header, HeaderName, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{auth_middleware, API_KEY_HEADER};
use crate::handler::{api_get, api_post, health_check};
use crate::middleware::rate_limit_middleware;
use crate::GatewayState;

/// Create the main router for the gateway
pub fn create_router(state: Arc<GatewayState>) -> Router {
    // Route layers run bottom-up: auth, then rate limit.
    let api = Router::new()
        .route("/api", get(api_get).post(api_post))
        .route_layer(from_fn_with_state(Arc::clone(&state), rate_limit_middleware))
        .route_layer(from_fn_with_state(Arc::clone(&state), auth_middleware));

    let mut router = Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(TraceLayer::new_for_http());

    if state.config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)]);
        router = router.layer(cors);
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(config: GatewayConfig) -> Router {
        create_router(Arc::new(GatewayState::new(config)))
    }

    fn post_json(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(GatewayConfig::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], json!("ok"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let app = router(GatewayConfig::builder().api_key("k").build());
        let response = app.oneshot(post_json(json!({"action": "list_tables"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({"success": false, "message": "API key is required"})
        );
    }

    #[tokio::test]
    async fn test_wrong_api_key() {
        let app = router(GatewayConfig::builder().api_key("k").build());
        let mut request = post_json(json!({"action": "list_tables"}));
        request.headers_mut().insert("x-api-key", "wrong".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ip_not_whitelisted() {
        let app = router(GatewayConfig::builder().ip_whitelist(vec!["10.0.0.1".into()]).build());
        let mut request = post_json(json!({"action": "list_tables"}));
        request.headers_mut().insert("x-forwarded-for", "10.0.0.2".parse().unwrap());
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    fn from_peer(mut request: Request<Body>, peer: &str, forwarded_for: &str) -> Request<Body> {
        let peer: std::net::SocketAddr = peer.parse().unwrap();
        request.extensions_mut().insert(axum::extract::ConnectInfo(peer));
        request.headers_mut().insert("x-forwarded-for", forwarded_for.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_forwarded_for_ignored_by_default() {
        let app = router(GatewayConfig::builder().ip_whitelist(vec!["10.0.0.1".into()]).build());
        let request = from_peer(post_json(json!({"action": "list_tables"})), "203.0.113.50:4000", "10.0.0.1");
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["message"], json!("Access denied from your IP address"));
    }

    #[tokio::test]
    async fn test_forwarded_for_behind_trusted_proxy() {
        let config = GatewayConfig::builder()
            .ip_whitelist(vec!["10.0.0.1".into()])
            .trust_forwarded_for(true)
            .build();
        let request = from_peer(post_json(json!({"action": "list_tables"})), "203.0.113.50:4000", "10.0.0.1");
        let response = router(config).oneshot(request).await.unwrap();
        // Past the whitelist; fails later on the missing connection fields.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_peer_address_keys_rate_limit() {
        let app = router(GatewayConfig::builder().rate_limit(1).build());
        let first = from_peer(post_json(json!({"action": "list_tables"})), "203.0.113.50:4000", "10.0.0.1");
        assert_ne!(app.clone().oneshot(first).await.unwrap().status(), StatusCode::TOO_MANY_REQUESTS);

        let second = from_peer(post_json(json!({"action": "list_tables"})), "203.0.113.50:4001", "10.0.0.2");
        let response = app.oneshot(second).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_missing_action() {
        let response = router(GatewayConfig::default())
            .oneshot(post_json(json!({"db_name": "shop"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], json!("Invalid or missing action parameter"));
    }

    #[tokio::test]
    async fn test_blob_default_rejected_before_connecting() {
        let response = router(GatewayConfig::default())
            .oneshot(post_json(json!({
                "action": "create_table",
                "db_host": "127.0.0.1",
                "db_user": "root",
                "db_name": "shop",
                "table_name": "files",
                "columns": [{"name": "data", "type": "BLOB", "default": "x"}]
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["message"], json!("BLOB columns cannot have default values in MySQL"));
    }

    #[tokio::test]
    async fn test_form_get_request() {
        let response = router(GatewayConfig::default())
            .oneshot(Request::get("/api?action=drop_everything").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let message = body_json(response).await["message"].as_str().unwrap().to_string();
        assert!(message.starts_with("Invalid action specified. Supported actions: check_connection"));
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let app = router(GatewayConfig::builder().rate_limit(1).build());
        let first = app.clone().oneshot(post_json(json!({}))).await.unwrap();
        assert_eq!(first.status(), StatusCode::BAD_REQUEST);
        assert_eq!(first.headers()["x-ratelimit-remaining"], "0");

        let second = app.oneshot(post_json(json!({}))).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            body_json(second).await["message"],
            json!("Rate limit exceeded. Please try again later.")
        );
    }
}
