//! Token extraction from Authenticate responses.
//!
//! Carriers disagree on where the bearer token lives. Each extractor below
//! checks one known shape; they are tried in order and the first non-empty
//! string wins.

use serde_json::Value;

use super::ApiError;

type Extractor = fn(&Value) -> Option<&str>;

const TOKEN_EXTRACTORS: &[(&str, Extractor)] = &[
    ("token", flat_token),
    ("accessToken", flat_access_token),
    ("access_token", flat_access_token_snake),
    ("data.token", nested_token),
    ("data.accessToken", nested_access_token),
    ("data.access_token", nested_access_token_snake),
];

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}

fn data(value: &Value) -> Option<&Value> {
    value.get("data")
}

fn flat_token(value: &Value) -> Option<&str> {
    field(value, "token")
}

fn flat_access_token(value: &Value) -> Option<&str> {
    field(value, "accessToken")
}

fn flat_access_token_snake(value: &Value) -> Option<&str> {
    field(value, "access_token")
}

fn nested_token(value: &Value) -> Option<&str> {
    field(data(value)?, "token")
}

fn nested_access_token(value: &Value) -> Option<&str> {
    field(data(value)?, "accessToken")
}

fn nested_access_token_snake(value: &Value) -> Option<&str> {
    field(data(value)?, "access_token")
}

/// Pull the bearer token out of an Authenticate response body
pub fn extract_token(body: &Value) -> Result<String, ApiError> {
    TOKEN_EXTRACTORS
        .iter()
        .find_map(|(name, extract)| {
            extract(body)
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| {
                    tracing::trace!(shape = *name, "Token extracted");
                    token.to_string()
                })
        })
        .ok_or(ApiError::TokenMissing)
}

/// The carrier label echoed back by the API, if any
pub fn extract_label(body: &Value) -> Option<String> {
    field(body, "shippingCompanyName")
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}
