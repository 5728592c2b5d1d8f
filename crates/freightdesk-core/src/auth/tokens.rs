use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::CredentialVault;
use crate::carrier::CarrierId;

/// Token file name in cache directory
pub const TOKEN_FILE: &str = "carrier_tokens.json";

/// Default token staleness threshold in minutes.
/// Carrier tokens are treated as short-lived regardless of the server-side TTL.
pub const DEFAULT_MAX_TOKEN_AGE_MINUTES: u32 = 10;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token: String,
    pub label: String,
    pub issued_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(token: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            label: label.into(),
            issued_at: Utc::now(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.issued_at
    }

    pub fn is_expired_at(&self, max_age_minutes: u32, now: DateTime<Utc>) -> bool {
        self.age(now) >= Duration::minutes(i64::from(max_age_minutes))
    }

    /// Get minutes remaining until the record goes stale (for display)
    pub fn minutes_until_stale(&self, max_age_minutes: u32) -> i64 {
        let stale_at = self.issued_at + Duration::minutes(i64::from(max_age_minutes));
        (stale_at - Utc::now()).num_minutes().max(0)
    }
}

// Hide token value in Debug output
impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("token", &"[REDACTED]")
            .field("label", &self.label)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// On-disk layout. `xpo` and `expo` are written together so that readers
/// keyed on either raw name see the same record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TokenBlob {
    estes: Option<TokenRecord>,
    xpo: Option<TokenRecord>,
    expo: Option<TokenRecord>,
}

impl TokenBlob {
    fn get(&self, carrier: CarrierId) -> Option<&TokenRecord> {
        match carrier {
            CarrierId::Estes => self.estes.as_ref(),
            CarrierId::Xpo => self.xpo.as_ref().or(self.expo.as_ref()),
        }
    }

    /// Records with an empty token are treated as absent
    fn drop_blank_tokens(&mut self) {
        for (key, slot) in [
            ("estes", &mut self.estes),
            ("xpo", &mut self.xpo),
            ("expo", &mut self.expo),
        ] {
            if slot.as_ref().is_some_and(|r| r.token.trim().is_empty()) {
                warn!(key, "Dropping persisted record with empty token");
                *slot = None;
            }
        }
    }

    fn set(&mut self, carrier: CarrierId, record: Option<TokenRecord>) {
        match carrier {
            CarrierId::Estes => self.estes = record,
            CarrierId::Xpo => {
                self.xpo = record.clone();
                self.expo = record;
            }
        }
    }
}

/// Persisted per-carrier bearer tokens.
///
/// None of the operations return errors: a missing record is `None`, and
/// persistence failures are logged and otherwise ignored.
pub struct TokenStore {
    path: Option<PathBuf>,
    blob: Mutex<TokenBlob>,
    vault: Arc<CredentialVault>,
}

impl TokenStore {
    /// Open the store at `path`, loading any previously persisted tokens.
    pub fn init(path: PathBuf, vault: Arc<CredentialVault>) -> Self {
        let blob = match Self::load(&path) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Discarding unreadable token file");
                TokenBlob::default()
            }
        };
        debug!(
            path = %path.display(),
            estes = blob.estes.is_some(),
            xpo = blob.get(CarrierId::Xpo).is_some(),
            "Token store loaded"
        );
        Self {
            path: Some(path),
            blob: Mutex::new(blob),
            vault,
        }
    }

    /// A store that never touches disk
    pub fn in_memory(vault: Arc<CredentialVault>) -> Self {
        Self {
            path: None,
            blob: Mutex::new(TokenBlob::default()),
            vault,
        }
    }

    /// Flush to disk and drop the in-memory records.
    pub fn teardown(&self) {
        let mut blob = self.blob();
        self.persist(&blob);
        *blob = TokenBlob::default();
    }

    pub fn vault(&self) -> &Arc<CredentialVault> {
        &self.vault
    }

    fn blob(&self) -> MutexGuard<'_, TokenBlob> {
        self.blob.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(path: &Path) -> Result<TokenBlob> {
        if !path.exists() {
            return Ok(TokenBlob::default());
        }
        let contents = std::fs::read_to_string(path).context("Failed to read token file")?;
        let mut blob: TokenBlob =
            serde_json::from_str(&contents).context("Failed to parse token file")?;
        blob.drop_blank_tokens();
        Ok(blob)
    }

    fn save(path: &Path, blob: &TokenBlob) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(blob)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn persist(&self, blob: &TokenBlob) {
        if let Some(ref path) = self.path {
            if let Err(e) = Self::save(path, blob) {
                warn!(path = %path.display(), error = %e, "Failed to save token file");
            }
        }
    }

    pub fn set_token(&self, carrier: CarrierId, token: &str, label: &str) {
        if token.is_empty() {
            warn!(%carrier, "Refusing to store empty token");
            return;
        }
        let mut blob = self.blob();
        blob.set(carrier, Some(TokenRecord::new(token, label)));
        self.persist(&blob);
        debug!(%carrier, label, "Token stored");
    }

    /// Get the bearer token for a carrier, fresh or not
    pub fn get_token(&self, carrier: CarrierId) -> Option<String> {
        self.blob().get(carrier).map(|r| r.token.clone())
    }

    pub fn record(&self, carrier: CarrierId) -> Option<TokenRecord> {
        self.blob().get(carrier).cloned()
    }

    pub fn is_expired(&self, carrier: CarrierId, max_age_minutes: u32) -> bool {
        self.is_expired_at(carrier, max_age_minutes, Utc::now())
    }

    /// True when there is no record, or the record is at least `max_age_minutes` old at `now`
    pub fn is_expired_at(&self, carrier: CarrierId, max_age_minutes: u32, now: DateTime<Utc>) -> bool {
        self.blob()
            .get(carrier)
            .map(|r| r.is_expired_at(max_age_minutes, now))
            .unwrap_or(true)
    }

    /// Remove a carrier's token along with its cached credentials
    pub fn clear_token(&self, carrier: CarrierId) {
        let mut blob = self.blob();
        blob.set(carrier, None);
        self.persist(&blob);
        drop(blob);
        self.vault.clear_credentials(carrier);
        debug!(%carrier, "Token cleared");
    }

    pub fn clear_all(&self) {
        let mut blob = self.blob();
        *blob = TokenBlob::default();
        self.persist(&blob);
        drop(blob);
        self.vault.clear_all();
        debug!("All tokens cleared");
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, carrier: CarrierId, issued_at: DateTime<Utc>) {
        let mut blob = self.blob();
        let existing = blob.get(carrier).cloned();
        if let Some(mut record) = existing {
            record.issued_at = issued_at;
            blob.set(carrier, Some(record));
        }
    }
}
