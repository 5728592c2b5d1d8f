//! HTTP client for the logistics backend.
//!
//! This module provides `CarrierClient` for the Authenticate endpoint and
//! the carrier-specific endpoints that need a bearer token. Payloads for the
//! carrier endpoints are passed through as opaque JSON.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::extract::{extract_label, extract_token};
use super::ApiError;
use crate::auth::Credentials;
use crate::carrier::CarrierId;

// ============================================================================
// Constants
// ============================================================================

/// Authenticate endpoint, relative to the API base URL
const AUTHENTICATE_PATH: &str = "/Logistics/Authenticate";

/// HTTP request timeout in seconds.
/// 30s allows for slow carrier responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Carrier endpoints that take a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierEndpoint {
    RateQuote,
    BillOfLading,
    PickupRequest,
    BolPdf,
}

impl CarrierEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            CarrierEndpoint::RateQuote => "/Logistics/create-rate-quote",
            CarrierEndpoint::BillOfLading => "/Logistics/create-bill-of-lading",
            CarrierEndpoint::PickupRequest => "/Logistics/create-pickup-request",
            CarrierEndpoint::BolPdf => "/Logistics/download-bol-pdf",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
    shipping_company: &'a str,
}

/// A successful Authenticate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub token: String,
    pub label: String,
}

/// Anything that can exchange credentials for a bearer token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        carrier: CarrierId,
        credentials: &Credentials,
    ) -> Result<AuthGrant, ApiError>;
}

/// Client for the logistics backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct CarrierClient {
    client: Client,
    base_url: String,
}

impl CarrierClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT_SECS)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, classifying the failure if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, retry_after.as_deref(), &body))
    }

    async fn read_json(response: Response, url: &str) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    /// POST an opaque JSON payload to a carrier endpoint with a bearer token.
    /// Single attempt; wrap in a [`RetryPolicy`](super::RetryPolicy) for 429 handling.
    pub async fn post_json(
        &self,
        endpoint: CarrierEndpoint,
        token: &str,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint.path());
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Self::read_json(response, &url).await
    }

    /// Download a bill of lading PDF
    pub async fn download_bol_pdf(&self, token: &str, body: &Value) -> Result<Vec<u8>, ApiError> {
        let url = self.url(CarrierEndpoint::BolPdf.path());
        debug!(url = %url, "POST (pdf)");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/pdf")
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl Authenticator for CarrierClient {
    async fn authenticate(
        &self,
        carrier: CarrierId,
        credentials: &Credentials,
    ) -> Result<AuthGrant, ApiError> {
        let url = self.url(AUTHENTICATE_PATH);
        let request = AuthRequest {
            username: &credentials.username,
            password: &credentials.password,
            shipping_company: carrier.as_str(),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let response = Self::check_response(response).await?;
        let body = Self::read_json(response, &url).await?;

        let token = extract_token(&body)?;
        let label = extract_label(&body).unwrap_or_else(|| carrier.display_name().to_string());
        info!(%carrier, label = %label, "Authenticated");

        Ok(AuthGrant { token, label })
    }
}
