//! Authorized carrier requests.
//!
//! `CarrierSession` ties the pieces together for callers: get a usable token
//! from the orchestrator, then run the request under the retry policy.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, CarrierClient, CarrierEndpoint, RetryPolicy};
use crate::auth::{AuthFailure, CredentialVault, RefreshOrchestrator, TokenStore, TOKEN_FILE};
use crate::carrier::CarrierId;
use crate::config::Config;

#[derive(Error, Debug)]
pub enum RequestError {
    /// No usable token; the operator needs to log in
    #[error(transparent)]
    Login(#[from] AuthFailure),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub struct CarrierSession {
    orchestrator: RefreshOrchestrator,
    client: CarrierClient,
    retry: RetryPolicy,
}

impl CarrierSession {
    pub fn new(orchestrator: RefreshOrchestrator, client: CarrierClient, retry: RetryPolicy) -> Self {
        Self {
            orchestrator,
            client,
            retry,
        }
    }

    /// Build a session from configuration, loading persisted tokens from the cache directory
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = CarrierClient::with_timeout(&config.api_base_url, config.request_timeout_secs)?;
        let tokens = Arc::new(TokenStore::init(
            config.cache_dir()?.join(TOKEN_FILE),
            Arc::new(CredentialVault::new()),
        ));
        let orchestrator = RefreshOrchestrator::new(
            tokens,
            Arc::new(client.clone()),
            config.default_credentials(),
        )
        .with_max_token_age(config.max_token_age_minutes);
        let retry = RetryPolicy::new().max_retries(config.max_retries);

        Ok(Self::new(orchestrator, client, retry))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn orchestrator(&self) -> &RefreshOrchestrator {
        &self.orchestrator
    }

    /// POST a JSON payload to a carrier endpoint
    pub async fn send(
        &self,
        carrier: CarrierId,
        endpoint: CarrierEndpoint,
        body: &Value,
    ) -> Result<Value, RequestError> {
        let token = self.orchestrator.ensure_token(carrier).await?;
        debug!(%carrier, ?endpoint, "Sending carrier request");
        let client = &self.client;
        let token = token.as_str();
        let response = self
            .retry
            .execute(move || client.post_json(endpoint, token, body))
            .await?;
        Ok(response)
    }

    pub async fn download_bol_pdf(&self, carrier: CarrierId, body: &Value) -> Result<Vec<u8>, RequestError> {
        let token = self.orchestrator.ensure_token(carrier).await?;
        let client = &self.client;
        let token = token.as_str();
        let pdf = self
            .retry
            .execute(move || client.download_bol_pdf(token, body))
            .await?;
        Ok(pdf)
    }

    /// Flush persisted tokens
    pub fn shutdown(&self) {
        self.orchestrator.tokens().teardown();
    }
}
