//! HTTP request handlers.
//!
//! `/api` accepts the action contract as a query string, a form body, or a
//! JSON object. Body fields override query fields of the same name.

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::{header, HeaderMap},
    response::Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlpanel::error::PanelError;
use std::sync::Arc;

use crate::middleware::ApiError;
use crate::GatewayState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn form_fields(target: &mut Map<String, Value>, encoded: &[u8]) {
    for (key, value) in url::form_urlencoded::parse(encoded) {
        target.insert(key.into_owned(), Value::String(value.into_owned()));
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Merge the query string and body into one request mapping.
pub fn request_fields(query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Result<Value, PanelError> {
    let mut fields = Map::new();
    if let Some(query) = query {
        form_fields(&mut fields, query.as_bytes());
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(fields));
    }

    if is_json(headers) {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => fields.extend(map),
            Ok(_) => return Err(PanelError::invalid("Request body must be a JSON object")),
            Err(e) => return Err(PanelError::invalid(format!("Invalid JSON body: {}", e))),
        }
    } else {
        form_fields(&mut fields, body);
    }
    Ok(Value::Object(fields))
}

async fn dispatch(state: &GatewayState, request: Value) -> Result<Json<Value>, ApiError> {
    let action = request.get("action").and_then(Value::as_str).unwrap_or("").to_string();

    match sqlpanel::actions::handle(&request, &state.config.database).await {
        Ok(body) => Ok(Json(body)),
        Err(e) => {
            if e.status_code() >= 500 {
                tracing::error!(action = %action, "Action failed: {}", e);
            } else {
                tracing::warn!(action = %action, "Action rejected: {}", e);
            }
            Err(ApiError::from(e))
        }
    }
}

/// `GET /api?action=...`
pub async fn api_get(
    State(state): State<Arc<GatewayState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let request = request_fields(query.as_deref(), &HeaderMap::new(), &[])?;
    dispatch(&state, request).await
}

/// `POST /api` with a form or JSON body.
pub async fn api_post(
    State(state): State<Arc<GatewayState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request = request_fields(query.as_deref(), &headers, &body)?;
    dispatch(&state, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_form_body_overrides_query() {
        let fields = request_fields(
            Some("action=list_tables&db_name=a"),
            &HeaderMap::new(),
            b"db_name=b&columns=%5B%5D",
        )
        .unwrap();
        assert_eq!(fields, json!({"action": "list_tables", "db_name": "b", "columns": "[]"}));
    }

    #[test]
    fn test_json_body() {
        let fields = request_fields(
            Some("db_name=a"),
            &json_headers(),
            br#"{"action": "create_table", "columns": [{"name": "id"}]}"#,
        )
        .unwrap();
        assert_eq!(fields["db_name"], json!("a"));
        assert_eq!(fields["columns"][0]["name"], json!("id"));
    }

    #[test]
    fn test_bad_json_body() {
        assert!(request_fields(None, &json_headers(), b"[1, 2]").is_err());
        assert!(request_fields(None, &json_headers(), b"{oops").is_err());
        assert_eq!(request_fields(None, &json_headers(), b"  ").unwrap(), json!({}));
    }
}
