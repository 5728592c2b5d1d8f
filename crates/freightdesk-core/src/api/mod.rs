//! REST API plumbing for the logistics backend.
//!
//! This module provides the `CarrierClient` for the Authenticate endpoint and
//! the bearer-token carrier endpoints, the `ApiError` taxonomy every call is
//! classified into, and the `RetryPolicy` used to ride out rate limits.

pub mod client;
pub mod error;
pub mod extract;
pub mod retry;

pub use client::{AuthGrant, Authenticator, CarrierClient, CarrierEndpoint};
pub use error::ApiError;
pub use extract::extract_token;
pub use retry::RetryPolicy;
