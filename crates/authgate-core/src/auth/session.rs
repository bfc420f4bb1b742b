//! In-memory session state and the single-flight verification protocol.
//!
//! A `Session` is built once at startup and passed to whatever needs it
//! (navigation guard, CLI commands). Clones share the same state.
//!
//! ```text
//! Anonymous --set_token--> Unverified --verify ok--> Verified
//!     ^                        |                        |
//!     +---- logout / verify failure --------------------+
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthBackend};
use crate::models::{Captcha, LoginRequest, RegisterRequest, User};
use crate::utils::mask_token;

use super::CredentialStore;

/// Upper bound on a single `/me` round-trip.
/// Matches the 10s request timeout the web client has always used.
pub const DEFAULT_VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Token must not be empty")]
    EmptyToken,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl SessionError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::EmptyToken => "The server did not issue a token".to_string(),
            SessionError::Api(e) => e.user_message(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No token.
    Anonymous,
    /// Token present, not yet confirmed by the backend.
    Unverified,
    /// Backend confirmed the current token.
    Verified,
}

/// Point-in-time copy of the session fields.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub token: String,
    pub user: Option<User>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verifying: bool,
}

type VerifyOutcome = Shared<BoxFuture<'static, bool>>;

struct PendingVerification {
    epoch: u64,
    outcome: VerifyOutcome,
}

#[derive(Default)]
struct SessionState {
    /// Empty string means no session.
    token: String,
    /// Present only once the backend confirmed `token`.
    user: Option<User>,
    verified_at: Option<DateTime<Utc>>,
    pending: Option<PendingVerification>,
    /// Bumped on every token change so late verification results can tell
    /// they belong to a previous token.
    epoch: u64,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        if self.token.is_empty() {
            SessionStatus::Anonymous
        } else if self.user.is_some() {
            SessionStatus::Verified
        } else {
            SessionStatus::Unverified
        }
    }
}

struct SessionInner {
    state: Mutex<SessionState>,
    store: CredentialStore,
    backend: Arc<dyn AuthBackend>,
    verify_timeout: Option<Duration>,
}

impl SessionInner {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop every session field and the persisted token. Caller holds the lock.
    ///
    /// Returns the detached pending verification, which the caller must drop
    /// only after releasing the lock: dropping the last handle runs
    /// `PendingRelease`, which locks the state again.
    #[must_use]
    fn reset(&self, state: &mut SessionState) -> Option<PendingVerification> {
        state.token.clear();
        state.user = None;
        state.verified_at = None;
        state.epoch += 1;
        self.store.clear();
        state.pending.take()
    }
}

/// Clears the pending slot when a verification future finishes or is dropped,
/// unless the slot has since been taken over by a newer token.
struct PendingRelease {
    inner: Weak<SessionInner>,
    epoch: u64,
}

impl Drop for PendingRelease {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.lock();
        let released = if state.pending.as_ref().is_some_and(|p| p.epoch == self.epoch) {
            state.pending.take()
        } else {
            None
        };
        drop(state);
        drop(released);
    }
}

/// Authentication session shared across the application.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session, restoring any persisted token from `store`.
    pub fn new(store: CredentialStore, backend: Arc<dyn AuthBackend>) -> Self {
        Self::with_verify_timeout(store, backend, Some(DEFAULT_VERIFY_TIMEOUT))
    }

    /// Like `new`, with an explicit verification timeout (`None` waits forever).
    ///
    /// The timeout is enforced with `tokio::time`, so `verify_once` must be
    /// awaited inside a tokio runtime with the time driver enabled.
    pub fn with_verify_timeout(
        store: CredentialStore,
        backend: Arc<dyn AuthBackend>,
        verify_timeout: Option<Duration>,
    ) -> Self {
        let token = store.load();
        debug!(token = %mask_token(&token), "Session restored");

        Self {
            inner: Arc::new(SessionInner {
                state: Mutex::new(SessionState {
                    token,
                    ..SessionState::default()
                }),
                store,
                backend,
                verify_timeout,
            }),
        }
    }

    // ===== Accessors =====

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.lock();
        SessionSnapshot {
            status: state.status(),
            token: state.token.clone(),
            user: state.user.clone(),
            verified_at: state.verified_at,
            verifying: state.pending.is_some(),
        }
    }

    /// Current token, empty when anonymous.
    pub fn token(&self) -> String {
        self.inner.lock().token.clone()
    }

    /// Token to attach as a bearer credential, if any.
    pub fn bearer(&self) -> Option<String> {
        let state = self.inner.lock();
        (!state.token.is_empty()).then(|| state.token.clone())
    }

    /// A token is present. It may not have been verified yet.
    pub fn is_logged_in(&self) -> bool {
        !self.inner.lock().token.is_empty()
    }

    pub fn is_verified(&self) -> bool {
        self.status() == SessionStatus::Verified
    }

    pub fn user(&self) -> Option<User> {
        self.inner.lock().user.clone()
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().verified_at
    }

    // ===== State transitions =====

    /// Adopt a newly issued token. Persists it to the durable tier when
    /// `durable` is set, the ephemeral tier otherwise.
    pub fn set_token(&self, token: &str, durable: bool) -> Result<(), SessionError> {
        if token.is_empty() {
            return Err(SessionError::EmptyToken);
        }

        let mut state = self.inner.lock();
        state.token = token.to_string();
        state.user = None;
        state.verified_at = None;
        state.epoch += 1;
        self.inner.store.save(token, durable);
        let stale = state.pending.take();
        drop(state);
        drop(stale);

        debug!(token = %mask_token(token), durable, "Token set");
        Ok(())
    }

    /// Forget the token, the verified user and the persisted credential.
    pub fn logout(&self) {
        let mut state = self.inner.lock();
        let stale = self.inner.reset(&mut state);
        drop(state);
        drop(stale);
        info!("Logged out");
    }

    /// Confirm the current token with the backend, at most once.
    ///
    /// Returns immediately when there is no token or it is already verified.
    /// Concurrent callers share a single in-flight `/me` request. Any
    /// failure, including a timeout, logs the session out.
    ///
    /// Must run inside a tokio runtime: the timeout uses `tokio::time` and
    /// panics when polled from any other executor.
    pub async fn verify_once(&self) -> bool {
        let outcome = {
            let mut state = self.inner.lock();
            match state.status() {
                SessionStatus::Anonymous => return false,
                SessionStatus::Verified => return true,
                SessionStatus::Unverified => {}
            }

            match state.pending.as_ref().map(|p| p.outcome.clone()) {
                Some(outcome) => {
                    debug!("Joining in-flight verification");
                    outcome
                }
                None => {
                    let outcome = Self::run_verification(
                        Arc::downgrade(&self.inner),
                        Arc::clone(&self.inner.backend),
                        self.inner.verify_timeout,
                        state.token.clone(),
                        state.epoch,
                    )
                    .boxed()
                    .shared();
                    state.pending = Some(PendingVerification {
                        epoch: state.epoch,
                        outcome: outcome.clone(),
                    });
                    outcome
                }
            }
        };

        outcome.await
    }

    /// The one `/me` call for a verification window.
    ///
    /// Holds only a weak handle on the session: the pending slot owns this
    /// future, so a strong one would keep the session alive forever.
    async fn run_verification(
        inner: Weak<SessionInner>,
        backend: Arc<dyn AuthBackend>,
        verify_timeout: Option<Duration>,
        token: String,
        epoch: u64,
    ) -> bool {
        let _release = PendingRelease {
            inner: inner.clone(),
            epoch,
        };

        debug!(token = %mask_token(&token), "Verifying token");
        let result = match verify_timeout {
            Some(limit) => tokio::time::timeout(limit, backend.me(&token))
                .await
                .unwrap_or(Err(ApiError::Timeout)),
            None => backend.me(&token).await,
        };

        let Some(inner) = inner.upgrade() else {
            return false;
        };
        let mut state = inner.lock();
        if state.epoch != epoch {
            debug!("Discarding verification result for a replaced token");
            return false;
        }

        let (verified, finished) = match result {
            Ok(user) => {
                debug!(user_id = user.id, username = %user.username, "Token verified");
                state.user = Some(user);
                state.verified_at = Some(Utc::now());
                (true, state.pending.take())
            }
            Err(e) => {
                warn!(error = %e, "Token verification failed, logging out");
                (false, inner.reset(&mut state))
            }
        };
        drop(state);
        drop(finished);
        verified
    }

    // ===== Backend calls =====

    /// Fetch a captcha challenge for the login/register forms.
    pub async fn captcha(&self) -> Result<Captcha, ApiError> {
        self.inner.backend.captcha().await
    }

    /// Log in and adopt the issued token.
    pub async fn login(&self, request: &LoginRequest, remember: bool) -> Result<(), SessionError> {
        let response = self.inner.backend.login(request).await?;
        self.set_token(&response.token, remember)?;
        info!(account = %request.account, remember, "Logged in");
        Ok(())
    }

    /// Register an account and adopt the issued token.
    pub async fn register(
        &self,
        request: &RegisterRequest,
        remember: bool,
    ) -> Result<(), SessionError> {
        let response = self.inner.backend.register(request).await?;
        self.set_token(&response.token, remember)?;
        info!(username = %request.username, remember, "Registered");
        Ok(())
    }

    /// GET an arbitrary endpoint with the current bearer token.
    ///
    /// A 401 means the token is no longer accepted, so the session is
    /// logged out, provided the token has not changed since the request
    /// was sent.
    pub async fn fetch(&self, path: &str) -> Result<Value, ApiError> {
        let (token, epoch) = {
            let state = self.inner.lock();
            (state.token.clone(), state.epoch)
        };
        let bearer = (!token.is_empty()).then_some(token.as_str());

        let result = self.inner.backend.fetch(path, bearer).await;
        if let Err(ref e) = result {
            if e.is_unauthorized() && bearer.is_some() {
                let mut state = self.inner.lock();
                if state.epoch == epoch {
                    warn!(path, "Token rejected, logging out");
                    let stale = self.inner.reset(&mut state);
                    drop(state);
                    drop(stale);
                }
            }
        }
        result
    }
}
