use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<DateTime<Utc>>,
    },

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authenticate response did not contain a token")]
    TokenMissing,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// The upstream `{message}` if the body carries one, else the raw body.
    fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
        let parsed = serde_json::from_str::<Value>(body).ok();
        if let Some(message) = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
        {
            return Self::truncate_body(message);
        }
        if body.trim().is_empty() {
            return status
                .canonical_reason()
                .unwrap_or("no response body")
                .to_string();
        }
        Self::truncate_body(body)
    }

    /// Classify a non-2xx response.
    ///
    /// `retry_after_header` is the raw `Retry-After` header value, if any.
    /// It only matters for 429s.
    pub fn from_status(
        status: reqwest::StatusCode,
        retry_after_header: Option<&str>,
        body: &str,
    ) -> Self {
        let message = Self::upstream_message(status, body);
        match status.as_u16() {
            400 => ApiError::Validation(message),
            401 | 403 => ApiError::Auth {
                status: status.as_u16(),
                message,
            },
            429 => ApiError::RateLimited {
                message,
                retry_after: parse_retry_after(retry_after_header, body, Utc::now()),
            },
            500..=599 => ApiError::Server {
                status: status.as_u16(),
                message,
            },
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ApiError::RateLimited { .. })
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth { .. })
    }

    pub fn retry_after(&self) -> Option<DateTime<Utc>> {
        match self {
            ApiError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Resolve a 429's retry instant.
///
/// The header wins; the body's `retryAfter` is only consulted when the
/// header is absent. Both accept delta seconds or an HTTP-date, and the body
/// additionally accepts an RFC 3339 instant. Everything is normalized to an
/// absolute UTC instant.
pub fn parse_retry_after(
    header: Option<&str>,
    body: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if let Some(value) = header {
        return parse_retry_after_value(value, now);
    }

    let body: Value = serde_json::from_str(body).ok()?;
    match body.get("retryAfter")? {
        Value::Number(n) => n.as_f64().map(|secs| after_seconds(secs, now)),
        Value::String(s) => parse_retry_after_value(s, now),
        _ => None,
    }
}

fn parse_retry_after_value(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        return Some(after_seconds(secs, now));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// `now + secs`, saturating at the latest representable instant
fn after_seconds(secs: f64, now: DateTime<Utc>) -> DateTime<Utc> {
    if secs.is_nan() || secs <= 0.0 {
        return now;
    }
    // Float-to-int casts saturate, so huge deltas land on i64::MAX here
    Duration::try_milliseconds((secs * 1000.0) as i64)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
