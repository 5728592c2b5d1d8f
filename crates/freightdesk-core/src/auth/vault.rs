//! Process-scoped credential cache.
//!
//! Credentials captured at login live here so that expired tokens can be
//! refreshed without prompting. Nothing in this module touches disk.
//! Passwords are sealed with ChaCha20-Poly1305 under a key generated when the
//! vault is created, so a heap dump doesn't hand them out in plaintext.
//!
//! The cache and the session flag die with the process. A short-lived
//! process such as a single CLI invocation starts with an inactive session,
//! so its refreshes go through auto-login with the configured
//! [`DefaultCredentials`](super::DefaultCredentials) instead.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::rngs::OsRng;
use tracing::{debug, warn};

use super::Credentials;
use crate::carrier::CarrierId;

struct SealedCredentials {
    username: String,
    nonce: Nonce,
    ciphertext: Vec<u8>,
}

pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
    entries: Mutex<HashMap<CarrierId, SealedCredentials>>,
    session_active: AtomicBool,
}

impl CredentialVault {
    pub fn new() -> Self {
        let key = ChaCha20Poly1305::generate_key(&mut OsRng);
        Self {
            cipher: ChaCha20Poly1305::new(&key),
            entries: Mutex::new(HashMap::new()),
            session_active: AtomicBool::new(false),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CarrierId, SealedCredentials>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cache credentials for a carrier and mark the session active
    pub fn set_credentials(&self, carrier: CarrierId, username: &str, password: &str) {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        match self.cipher.encrypt(&nonce, password.as_bytes()) {
            Ok(ciphertext) => {
                self.entries().insert(
                    carrier,
                    SealedCredentials {
                        username: username.to_string(),
                        nonce,
                        ciphertext,
                    },
                );
                debug!(%carrier, "Credentials cached");
            }
            Err(e) => warn!(%carrier, error = %e, "Failed to seal credentials"),
        }
        self.session_active.store(true, Ordering::SeqCst);
    }

    pub fn get_credentials(&self, carrier: CarrierId) -> Option<Credentials> {
        let entries = self.entries();
        let sealed = entries.get(&carrier)?;
        match self.cipher.decrypt(&sealed.nonce, sealed.ciphertext.as_slice()) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(password) => Some(Credentials::new(sealed.username.clone(), password)),
                Err(_) => {
                    warn!(%carrier, "Cached password is not valid UTF-8");
                    None
                }
            },
            Err(e) => {
                warn!(%carrier, error = %e, "Failed to unseal credentials");
                None
            }
        }
    }

    pub fn has_credentials(&self, carrier: CarrierId) -> bool {
        self.entries().contains_key(&carrier)
    }

    pub fn clear_credentials(&self, carrier: CarrierId) {
        if self.entries().remove(&carrier).is_some() {
            debug!(%carrier, "Credentials cleared");
        }
    }

    /// Drop every cached credential. The session flag is left alone.
    pub fn clear_all(&self) {
        self.entries().clear();
    }

    /// Full logout: drop credentials and the session flag.
    pub fn end_session(&self) {
        self.clear_all();
        self.session_active.store(false, Ordering::SeqCst);
        debug!("Session ended");
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }
}

impl Default for CredentialVault {
    fn default() -> Self {
        Self::new()
    }
}
