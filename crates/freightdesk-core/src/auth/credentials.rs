use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use crate::carrier::CarrierId;

const SERVICE_NAME: &str = "freightdesk";

/// Prefix for environment-scoped default credentials,
/// e.g. `FREIGHTDESK_XPO_USERNAME` / `FREIGHTDESK_XPO_PASSWORD`.
const ENV_PREFIX: &str = "FREIGHTDESK";

/// A username/password pair for the Authenticate endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// A source of default credentials for full auto-login.
///
/// This is distinct from the [`CredentialVault`](super::CredentialVault),
/// which only holds what the operator typed in during this process.
pub trait DefaultCredentials: Send + Sync {
    fn credentials_for(&self, carrier: CarrierId) -> Option<Credentials>;
}

/// No default credentials. Full auto-login always fails fast.
pub struct NoDefaultCredentials;

impl DefaultCredentials for NoDefaultCredentials {
    fn credentials_for(&self, _carrier: CarrierId) -> Option<Credentials> {
        None
    }
}

/// Default credentials read from environment variables.
pub struct EnvCredentials;

impl EnvCredentials {
    fn var_name(carrier: CarrierId, field: &str) -> String {
        format!(
            "{}_{}_{}",
            ENV_PREFIX,
            carrier.as_str().to_ascii_uppercase(),
            field
        )
    }
}

impl DefaultCredentials for EnvCredentials {
    fn credentials_for(&self, carrier: CarrierId) -> Option<Credentials> {
        let username = std::env::var(Self::var_name(carrier, "USERNAME")).ok()?;
        let password = std::env::var(Self::var_name(carrier, "PASSWORD")).ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Credentials::new(username, password))
    }
}

/// Default credentials remembered in the OS keychain, one entry per carrier.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(carrier: CarrierId) -> Result<Entry> {
        Entry::new(SERVICE_NAME, carrier.as_str()).context("Failed to create keyring entry")
    }

    /// Store username and password for a carrier in the OS keychain
    pub fn store(carrier: CarrierId, credentials: &Credentials) -> Result<()> {
        // Username and password share one secret so a single lookup returns both
        let secret = format!("{}\n{}", credentials.username, credentials.password);
        Self::entry(carrier)?
            .set_password(&secret)
            .context("Failed to store credentials in keychain")?;
        Ok(())
    }

    /// Retrieve the stored credentials for a carrier
    pub fn get(carrier: CarrierId) -> Result<Credentials> {
        let secret = Self::entry(carrier)?
            .get_password()
            .context("Failed to retrieve credentials from keychain")?;
        let (username, password) = secret
            .split_once('\n')
            .ok_or_else(|| anyhow::anyhow!("Malformed keychain entry for {}", carrier))?;
        Ok(Credentials::new(username, password))
    }

    /// Delete stored credentials for a carrier
    pub fn delete(carrier: CarrierId) -> Result<()> {
        Self::entry(carrier)?
            .delete_credential()
            .context("Failed to delete credential from keychain")?;
        Ok(())
    }
}

impl DefaultCredentials for CredentialStore {
    fn credentials_for(&self, carrier: CarrierId) -> Option<Credentials> {
        match Self::get(carrier) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                debug!(%carrier, error = %e, "No keychain credentials");
                None
            }
        }
    }
}

/// Tries each source in order; the first one with credentials wins.
pub struct ChainedCredentials {
    sources: Vec<Arc<dyn DefaultCredentials>>,
}

impl ChainedCredentials {
    pub fn new(sources: Vec<Arc<dyn DefaultCredentials>>) -> Self {
        Self { sources }
    }
}

impl DefaultCredentials for ChainedCredentials {
    fn credentials_for(&self, carrier: CarrierId) -> Option<Credentials> {
        self.sources
            .iter()
            .find_map(|source| source.credentials_for(carrier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_hide_password_in_debug() {
        let creds = Credentials::new("dispatch", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("dispatch"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(
            EnvCredentials::var_name(CarrierId::Xpo, "USERNAME"),
            "FREIGHTDESK_XPO_USERNAME"
        );
        assert_eq!(
            EnvCredentials::var_name(CarrierId::Estes, "PASSWORD"),
            "FREIGHTDESK_ESTES_PASSWORD"
        );
    }

    #[test]
    fn test_no_default_credentials() {
        assert!(NoDefaultCredentials.credentials_for(CarrierId::Xpo).is_none());
    }

    struct Fixed(&'static str);

    impl DefaultCredentials for Fixed {
        fn credentials_for(&self, _carrier: CarrierId) -> Option<Credentials> {
            Some(Credentials::new(self.0, "pw"))
        }
    }

    #[test]
    fn test_chained_first_match_wins() {
        let chain = ChainedCredentials::new(vec![
            Arc::new(NoDefaultCredentials),
            Arc::new(Fixed("remembered")),
            Arc::new(Fixed("later")),
        ]);
        let creds = chain.credentials_for(CarrierId::Estes).unwrap();
        assert_eq!(creds.username, "remembered");

        let empty = ChainedCredentials::new(vec![Arc::new(NoDefaultCredentials)]);
        assert!(empty.credentials_for(CarrierId::Estes).is_none());
    }
}
