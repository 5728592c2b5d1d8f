//! freightdesk-core - carrier sessions and resilient requests.
//!
//! Tokens for the freight carriers are short-lived opaque bearer strings.
//! This crate keeps them fresh (silent refresh with cached credentials, then
//! auto-login with configured defaults) and retries carrier calls that hit a
//! rate limit.

pub mod api;
pub mod auth;
pub mod carrier;
pub mod config;
pub mod session;

pub use api::{ApiError, CarrierClient, CarrierEndpoint, RetryPolicy};
pub use auth::{AuthFailure, CredentialVault, RefreshOrchestrator, TokenState, TokenStore};
pub use carrier::CarrierId;
pub use config::Config;
pub use session::{CarrierSession, RequestError};
