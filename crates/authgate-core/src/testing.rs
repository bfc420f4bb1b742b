//! Scripted `AuthBackend` for unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};

use crate::api::{ApiError, AuthBackend};
use crate::models::{Captcha, LoginRequest, RegisterRequest, TokenResponse, User};

/// How `me` behaves.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Online,
    /// Every `me` call fails before reaching a verdict.
    Offline,
    /// `me` never resolves.
    Hanging,
}

pub(crate) struct MockBackend {
    accepted: Mutex<HashSet<String>>,
    delay: Duration,
    mode: Mode,
    me_calls: AtomicUsize,
    last_fetch_token: Mutex<Option<String>>,
}

impl MockBackend {
    /// Password accepted by `login`
    pub const PASSWORD: &'static str = "correct-horse";

    /// Username `register` reports as already taken
    pub const TAKEN_USERNAME: &'static str = "taken";

    pub fn accepting(tokens: &[&str]) -> Self {
        Self {
            accepted: Mutex::new(tokens.iter().map(|t| t.to_string()).collect()),
            delay: Duration::ZERO,
            mode: Mode::Online,
            me_calls: AtomicUsize::new(0),
            last_fetch_token: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn offline(mut self) -> Self {
        self.mode = Mode::Offline;
        self
    }

    pub fn hanging(mut self) -> Self {
        self.mode = Mode::Hanging;
        self
    }

    pub fn me_calls(&self) -> usize {
        self.me_calls.load(Ordering::SeqCst)
    }

    pub fn last_fetch_token(&self) -> Option<String> {
        self.last_fetch_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop accepting `token` from now on.
    pub fn revoke(&self, token: &str) {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token);
    }

    fn accepts(&self, token: &str) -> bool {
        self.accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }

    async fn answer_me(&self, token: &str) -> Result<User, ApiError> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.mode {
            Mode::Hanging => futures::future::pending().await,
            Mode::Offline => Err(ApiError::InvalidResponse("connection reset".to_string())),
            Mode::Online if self.accepts(token) => Ok(User {
                id: 1,
                username: format!("user-{}", token),
                email: format!("{}@example.com", token),
            }),
            Mode::Online => Err(ApiError::Unauthorized("token invalid or expired".to_string())),
        }
    }
}

impl AuthBackend for MockBackend {
    fn captcha(&self) -> BoxFuture<'_, Result<Captcha, ApiError>> {
        async {
            Ok::<_, ApiError>(Captcha {
                captcha_id: "captcha-1".to_string(),
                image: "data:image/png;base64,AAAA".to_string(),
                expires_in: Some(120),
            })
        }
        .boxed()
    }

    fn login<'a>(&'a self, request: &'a LoginRequest) -> BoxFuture<'a, Result<TokenResponse, ApiError>> {
        async move {
            if request.password == Self::PASSWORD {
                Ok(TokenResponse {
                    token: format!("tok-{}", request.account),
                })
            } else {
                Err(ApiError::BadRequest("wrong account or password".to_string()))
            }
        }
        .boxed()
    }

    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, Result<TokenResponse, ApiError>> {
        async move {
            if request.username == Self::TAKEN_USERNAME {
                Err(ApiError::Conflict("username or email already exists".to_string()))
            } else {
                Ok(TokenResponse {
                    token: format!("tok-{}", request.username),
                })
            }
        }
        .boxed()
    }

    fn me<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<User, ApiError>> {
        self.answer_me(token).boxed()
    }

    fn fetch<'a>(
        &'a self,
        path: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        async move {
            *self
                .last_fetch_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = token.map(str::to_string);

            match token {
                Some(token) if self.accepts(token) => Ok(json!({ "path": path })),
                _ => Err(ApiError::Unauthorized(String::new())),
            }
        }
        .boxed()
    }
}
