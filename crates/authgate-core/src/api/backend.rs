use futures::future::BoxFuture;
use serde_json::Value;

use crate::models::{Captcha, LoginRequest, RegisterRequest, TokenResponse, User};

use super::ApiError;

/// Backend calls the session depends on.
///
/// Methods return boxed futures so the trait stays object safe; the session
/// holds an `Arc<dyn AuthBackend>` and drives `me` from a shared,
/// `'static` verification future.
pub trait AuthBackend: Send + Sync {
    /// Fetch a fresh captcha challenge. Never carries a bearer token.
    fn captcha(&self) -> BoxFuture<'_, Result<Captcha, ApiError>>;

    /// Exchange credentials for a token. Never carries a bearer token.
    fn login<'a>(&'a self, request: &'a LoginRequest)
        -> BoxFuture<'a, Result<TokenResponse, ApiError>>;

    /// Create an account and receive a token. Never carries a bearer token.
    fn register<'a>(
        &'a self,
        request: &'a RegisterRequest,
    ) -> BoxFuture<'a, Result<TokenResponse, ApiError>>;

    /// Ask the backend who owns `token`.
    fn me<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<User, ApiError>>;

    /// Authenticated GET of an arbitrary JSON endpoint.
    fn fetch<'a>(
        &'a self,
        path: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Value, ApiError>>;
}
