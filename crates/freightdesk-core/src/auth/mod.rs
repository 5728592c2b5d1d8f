//! Authentication module for managing carrier sessions and credentials.
//!
//! This module provides:
//! - `TokenStore`: Persisted per-carrier bearer tokens with age-based staleness
//! - `CredentialVault`: Process-scoped credential cache gating silent refresh
//! - `RefreshOrchestrator`: Decides between cached token, silent refresh and auto-login
//! - `DefaultCredentials`: Environment or keychain credentials for auto-login
//!
//! Tokens are considered stale 10 minutes after they were issued.

pub mod credentials;
pub mod orchestrator;
pub mod tokens;
pub mod vault;

pub use credentials::{
    ChainedCredentials, CredentialStore, Credentials, DefaultCredentials, EnvCredentials, NoDefaultCredentials,
};
pub use orchestrator::{AuthFailure, RefreshOrchestrator, TokenState};
pub use tokens::{TokenRecord, TokenStore, DEFAULT_MAX_TOKEN_AGE_MINUTES, TOKEN_FILE};
pub use vault::CredentialVault;
