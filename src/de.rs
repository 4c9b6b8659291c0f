//! Lenient field deserializers for request payloads.
//!
//! Requests arrive as JSON bodies, form posts, or query strings, so a boolean
//! may show up as `true`, `1`, or `"on"` and a number as `5` or `"5"`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// Interpret a loose boolean token. Empty input means "not supplied".
pub fn parse_flag(token: &str) -> Option<Result<bool, String>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    Some(match token.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("invalid boolean value '{}'", token)),
    })
}

/// `Option<bool>` from a bool, `0`/`1`, or a boolean-ish string.
pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(D::Error::custom(format!("invalid boolean value '{}'", n))),
        },
        Some(Value::String(s)) => parse_flag(&s).transpose().map_err(D::Error::custom),
        Some(other) => Err(D::Error::custom(format!("invalid boolean value '{}'", other))),
    }
}

/// `Option<T>` from a JSON number or a numeric string.
pub fn number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let text = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => return Err(D::Error::custom(format!("expected a number, got {}", other))),
    };
    text.parse::<T>()
        .map(Some)
        .map_err(|_| D::Error::custom(format!("invalid number '{}'", text)))
}

/// `Option<String>` from a string or any scalar, rendered as text.
pub fn scalar_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(D::Error::custom(format!("expected a scalar, got {}", other))),
    }
}

/// `Option<T>` from a JSON value or from a string holding JSON.
///
/// Form posts carry structured fields (`columns`, `record`) as encoded text.
pub fn json_text<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| D::Error::custom(format!("invalid JSON: {}", e))),
        Some(value) => serde_json::from_value(value).map(Some).map_err(D::Error::custom),
    }
}
