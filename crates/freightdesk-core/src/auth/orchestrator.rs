//! Lazy per-carrier token refresh.
//!
//! Callers ask [`RefreshOrchestrator::ensure_token`] for a bearer token right
//! before each carrier request. A fresh token is returned as-is. A stale or
//! missing one is replaced by, in order:
//!
//! 1. a silent refresh with the credentials cached in the [`CredentialVault`]
//!    (only while the session is active),
//! 2. a full auto-login with the configured [`DefaultCredentials`].
//!
//! Each path is tried at most once per refresh. If both fail the caller gets
//! an [`AuthFailure`] back and is expected to prompt for a manual login.
//!
//! Concurrent callers for the same carrier share one in-flight refresh.
//!
//! [`CredentialVault`]: super::CredentialVault

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{DefaultCredentials, TokenStore, DEFAULT_MAX_TOKEN_AGE_MINUTES};
use crate::api::{ApiError, Authenticator};
use crate::carrier::CarrierId;

/// Where a carrier's token sits in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Valid,
    Stale,
    Refreshing,
    ReauthRequired,
    Failed,
}

/// Returned when neither silent refresh nor auto-login produced a token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{carrier} login required: {reason}")]
pub struct AuthFailure {
    pub carrier: CarrierId,
    pub reason: String,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthFailure>>>;

struct Inner {
    tokens: Arc<TokenStore>,
    authenticator: Arc<dyn Authenticator>,
    defaults: Arc<dyn DefaultCredentials>,
    in_flight: Mutex<HashMap<CarrierId, (u64, RefreshFuture)>>,
    next_refresh_id: AtomicU64,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<CarrierId, (u64, RefreshFuture)>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn refresh(self: Arc<Self>, carrier: CarrierId) -> Result<String, AuthFailure> {
        let vault = self.tokens.vault();
        let mut reasons = Vec::new();

        if !vault.is_session_active() {
            reasons.push("no active session".to_string());
        } else if let Some(credentials) = vault.get_credentials(carrier) {
            debug!(%carrier, state = ?TokenState::Refreshing, "Attempting silent refresh");
            match self.authenticator.authenticate(carrier, &credentials).await {
                Ok(grant) => {
                    self.tokens.set_token(carrier, &grant.token, &grant.label);
                    info!(%carrier, "Silent refresh succeeded");
                    return Ok(grant.token);
                }
                Err(e) => {
                    warn!(%carrier, error = %e, state = ?TokenState::ReauthRequired, "Silent refresh failed");
                    reasons.push(format!("silent refresh failed: {}", e));
                }
            }
        } else {
            reasons.push("no cached credentials".to_string());
        }

        match self.defaults.credentials_for(carrier) {
            None => reasons.push("no default credentials configured".to_string()),
            Some(credentials) => {
                debug!(%carrier, "Attempting full auto-login");
                match self.authenticator.authenticate(carrier, &credentials).await {
                    Ok(grant) => {
                        self.tokens.set_token(carrier, &grant.token, &grant.label);
                        vault.set_credentials(carrier, &credentials.username, &credentials.password);
                        info!(%carrier, "Auto-login succeeded");
                        return Ok(grant.token);
                    }
                    Err(e) => {
                        warn!(%carrier, error = %e, state = ?TokenState::Failed, "Auto-login failed");
                        reasons.push(format!("auto-login failed: {}", e));
                    }
                }
            }
        }

        Err(AuthFailure {
            carrier,
            reason: reasons.join("; "),
        })
    }
}

#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
    max_token_age_minutes: u32,
}

impl RefreshOrchestrator {
    pub fn new(
        tokens: Arc<TokenStore>,
        authenticator: Arc<dyn Authenticator>,
        defaults: Arc<dyn DefaultCredentials>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                tokens,
                authenticator,
                defaults,
                in_flight: Mutex::new(HashMap::new()),
                next_refresh_id: AtomicU64::new(0),
            }),
            max_token_age_minutes: DEFAULT_MAX_TOKEN_AGE_MINUTES,
        }
    }

    pub fn with_max_token_age(mut self, minutes: u32) -> Self {
        self.max_token_age_minutes = minutes;
        self
    }

    pub fn max_token_age_minutes(&self) -> u32 {
        self.max_token_age_minutes
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.inner.tokens
    }

    fn fresh_token(&self, carrier: CarrierId) -> Option<String> {
        let tokens = &self.inner.tokens;
        if tokens.is_expired(carrier, self.max_token_age_minutes) {
            None
        } else {
            tokens.get_token(carrier)
        }
    }

    /// Current state for display. Never triggers a refresh.
    pub fn state(&self, carrier: CarrierId) -> TokenState {
        if self.inner.in_flight().contains_key(&carrier) {
            return TokenState::Refreshing;
        }
        match self.inner.tokens.record(carrier) {
            None => TokenState::Unauthenticated,
            Some(_) if self.inner.tokens.is_expired(carrier, self.max_token_age_minutes) => {
                TokenState::Stale
            }
            Some(_) => TokenState::Valid,
        }
    }

    /// Get a usable bearer token, refreshing it first if needed
    pub async fn ensure_token(&self, carrier: CarrierId) -> Result<String, AuthFailure> {
        if let Some(token) = self.fresh_token(carrier) {
            return Ok(token);
        }

        let (refresh_id, refresh) = {
            let mut in_flight = self.inner.in_flight();
            if let Some((id, pending)) = in_flight.get(&carrier) {
                debug!(%carrier, "Joining in-flight refresh");
                (*id, pending.clone())
            } else {
                // Another caller may have finished a refresh since the check above
                if let Some(token) = self.fresh_token(carrier) {
                    return Ok(token);
                }
                let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
                let pending = self.inner.clone().refresh(carrier).boxed().shared();
                in_flight.insert(carrier, (id, pending.clone()));
                (id, pending)
            }
        };

        let result = refresh.await;

        let mut in_flight = self.inner.in_flight();
        if matches!(in_flight.get(&carrier), Some((id, _)) if *id == refresh_id) {
            in_flight.remove(&carrier);
        }

        result
    }

    /// Interactive login with operator-supplied credentials
    pub async fn login(
        &self,
        carrier: CarrierId,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let credentials = super::Credentials::new(username, password);
        let grant = self
            .inner
            .authenticator
            .authenticate(carrier, &credentials)
            .await?;
        self.inner.tokens.set_token(carrier, &grant.token, &grant.label);
        self.inner
            .tokens
            .vault()
            .set_credentials(carrier, username, password);
        info!(%carrier, "Logged in");
        Ok(grant.token)
    }

    /// Forget one carrier's token and cached credentials
    pub fn logout(&self, carrier: CarrierId) {
        self.inner.tokens.clear_token(carrier);
        info!(%carrier, "Logged out");
    }

    /// Full logout: every token, every credential, and the session flag
    pub fn logout_all(&self) {
        self.inner.tokens.clear_all();
        self.inner.tokens.vault().end_session();
        info!("Logged out of all carriers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AuthGrant;
    use crate::auth::{ChainedCredentials, CredentialVault, Credentials, NoDefaultCredentials};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Replays scripted Authenticate outcomes and records who asked
    #[derive(Default)]
    struct ScriptedAuth {
        outcomes: Mutex<VecDeque<Result<AuthGrant, ApiError>>>,
        usernames: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedAuth {
        fn new(outcomes: Vec<Result<AuthGrant, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for ScriptedAuth {
        async fn authenticate(
            &self,
            _carrier: CarrierId,
            credentials: &Credentials,
        ) -> Result<AuthGrant, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.usernames.lock().unwrap().push(credentials.username.clone());
            tokio::task::yield_now().await;
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ApiError::TokenMissing))
        }
    }

    struct FixedDefaults;

    impl DefaultCredentials for FixedDefaults {
        fn credentials_for(&self, _carrier: CarrierId) -> Option<Credentials> {
            Some(Credentials::new("env-user", "env-pass"))
        }
    }

    fn grant(token: &str) -> Result<AuthGrant, ApiError> {
        Ok(AuthGrant {
            token: token.to_string(),
            label: "XPO".to_string(),
        })
    }

    fn unauthorized() -> Result<AuthGrant, ApiError> {
        Err(ApiError::Auth {
            status: 401,
            message: "bad password".to_string(),
        })
    }

    fn setup(
        auth: Arc<ScriptedAuth>,
        defaults: Arc<dyn DefaultCredentials>,
    ) -> (RefreshOrchestrator, Arc<TokenStore>) {
        let tokens = Arc::new(TokenStore::in_memory(Arc::new(CredentialVault::new())));
        let orchestrator = RefreshOrchestrator::new(tokens.clone(), auth, defaults);
        (orchestrator, tokens)
    }

    #[tokio::test]
    async fn test_fresh_token_returned_without_network() {
        let auth = ScriptedAuth::new(vec![]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(NoDefaultCredentials));
        tokens.set_token(CarrierId::Xpo, "cached", "XPO");

        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Valid);
        assert_eq!(orchestrator.ensure_token(CarrierId::Xpo).await.unwrap(), "cached");
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn test_silent_refresh_skips_auto_login() {
        let auth = ScriptedAuth::new(vec![grant("refreshed")]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(FixedDefaults));
        tokens.vault().set_credentials(CarrierId::Xpo, "operator", "pw");
        tokens.set_token(CarrierId::Xpo, "old", "XPO");
        tokens.backdate(CarrierId::Xpo, Utc::now() - Duration::minutes(11));

        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Stale);
        let token = orchestrator.ensure_token(CarrierId::Xpo).await.unwrap();

        assert_eq!(token, "refreshed");
        assert_eq!(auth.calls(), 1);
        assert_eq!(*auth.usernames.lock().unwrap(), vec!["operator"]);
        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Valid);
        assert_eq!(tokens.get_token("expo".parse().unwrap()).as_deref(), Some("refreshed"));
    }

    #[tokio::test]
    async fn test_failed_silent_refresh_falls_back_to_auto_login() {
        let auth = ScriptedAuth::new(vec![unauthorized(), grant("from-env")]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(FixedDefaults));
        tokens.vault().set_credentials(CarrierId::Estes, "operator", "stale-pw");

        let token = orchestrator.ensure_token(CarrierId::Estes).await.unwrap();

        assert_eq!(token, "from-env");
        assert_eq!(*auth.usernames.lock().unwrap(), vec!["operator", "env-user"]);
        let cached = tokens.vault().get_credentials(CarrierId::Estes).unwrap();
        assert_eq!(cached.username, "env-user");
    }

    #[tokio::test]
    async fn test_active_session_without_carrier_credentials_auto_logs_in() {
        let auth = ScriptedAuth::new(vec![grant("from-env")]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(FixedDefaults));
        tokens.vault().set_credentials(CarrierId::Estes, "operator", "pw");
        assert!(tokens.vault().is_session_active());

        let token = orchestrator.ensure_token(CarrierId::Xpo).await.unwrap();

        assert_eq!(token, "from-env");
        assert_eq!(auth.calls(), 1);
        assert_eq!(*auth.usernames.lock().unwrap(), vec!["env-user"]);
    }

    #[tokio::test]
    async fn test_chained_defaults_use_remembered_credentials() {
        struct Remembered;

        impl DefaultCredentials for Remembered {
            fn credentials_for(&self, _carrier: CarrierId) -> Option<Credentials> {
                Some(Credentials::new("remembered", "pw"))
            }
        }

        let auth = ScriptedAuth::new(vec![grant("from-keychain")]);
        let defaults = ChainedCredentials::new(vec![
            Arc::new(NoDefaultCredentials),
            Arc::new(Remembered),
        ]);
        let (orchestrator, _tokens) = setup(auth.clone(), Arc::new(defaults));

        let token = orchestrator.ensure_token(CarrierId::Estes).await.unwrap();

        assert_eq!(token, "from-keychain");
        assert_eq!(*auth.usernames.lock().unwrap(), vec!["remembered"]);
    }

    #[tokio::test]
    async fn test_auto_login_marks_session_active() {
        let auth = ScriptedAuth::new(vec![grant("from-env")]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(FixedDefaults));
        assert!(!tokens.vault().is_session_active());

        orchestrator.ensure_token(CarrierId::Xpo).await.unwrap();

        assert_eq!(auth.calls(), 1);
        assert!(tokens.vault().is_session_active());
        assert!(tokens.vault().get_credentials(CarrierId::Xpo).is_some());
    }

    #[tokio::test]
    async fn test_no_session_and_failing_auto_login_returns_failure() {
        let auth = ScriptedAuth::new(vec![unauthorized(), unauthorized()]);
        let (orchestrator, _tokens) = setup(auth.clone(), Arc::new(FixedDefaults));

        let failure = orchestrator.ensure_token(CarrierId::Xpo).await.unwrap_err();

        assert_eq!(failure.carrier, CarrierId::Xpo);
        assert!(failure.reason.contains("no active session"));
        assert!(failure.reason.contains("auto-login failed"));
        assert_eq!(auth.calls(), 1);
        assert!(auth.calls() <= 2);
    }

    #[tokio::test]
    async fn test_both_paths_fail_at_most_two_calls() {
        let auth = ScriptedAuth::new(vec![unauthorized(), unauthorized(), grant("never")]);
        let (orchestrator, tokens) = setup(auth.clone(), Arc::new(FixedDefaults));
        tokens.vault().set_credentials(CarrierId::Xpo, "operator", "pw");

        let failure = orchestrator.ensure_token(CarrierId::Xpo).await.unwrap_err();

        assert_eq!(auth.calls(), 2);
        assert!(failure.reason.contains("silent refresh failed"));
        assert!(tokens.get_token(CarrierId::Xpo).is_none());
    }

    #[tokio::test]
    async fn test_no_default_credentials_fails_fast() {
        let auth = ScriptedAuth::new(vec![grant("unused")]);
        let (orchestrator, _tokens) = setup(auth.clone(), Arc::new(NoDefaultCredentials));

        let failure = orchestrator.ensure_token(CarrierId::Estes).await.unwrap_err();

        assert_eq!(auth.calls(), 0);
        assert!(failure.reason.contains("no default credentials"));
        assert!(failure.to_string().starts_with("estes login required"));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let auth = ScriptedAuth::new(vec![grant("shared"), grant("duplicate")]);
        let (orchestrator, _tokens) = setup(auth.clone(), Arc::new(FixedDefaults));

        let (a, b, c) = tokio::join!(
            orchestrator.ensure_token(CarrierId::Xpo),
            orchestrator.ensure_token("expo".parse().unwrap()),
            orchestrator.ensure_token(CarrierId::Xpo),
        );

        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(c.unwrap(), "shared");
        assert_eq!(auth.calls(), 1);
        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Valid);
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let auth = ScriptedAuth::new(vec![grant("interactive")]);
        let (orchestrator, tokens) = setup(auth, Arc::new(NoDefaultCredentials));

        orchestrator.login(CarrierId::Xpo, "operator", "pw").await.unwrap();
        assert!(tokens.vault().is_session_active());
        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Valid);

        orchestrator.logout(CarrierId::Xpo);
        assert_eq!(orchestrator.state(CarrierId::Xpo), TokenState::Unauthenticated);
        assert!(tokens.vault().get_credentials(CarrierId::Xpo).is_none());
        assert!(tokens.vault().is_session_active());

        orchestrator.logout_all();
        assert!(!tokens.vault().is_session_active());
    }
}
