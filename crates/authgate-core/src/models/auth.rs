//! Request and response shapes for the auth endpoints.
//!
//! Field names follow the backend's snake_case JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Captcha challenge from `GET /api/captcha`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Captcha {
    pub captcha_id: String,
    /// Opaque image payload, usually a `data:` URI.
    pub image: String,
    /// Seconds until the challenge expires, when the backend reports it.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Body of `POST /api/auth/login`.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoginRequest {
    /// Username or email.
    pub account: String,
    pub password: String,
    pub captcha_id: String,
    pub captcha: String,
}

/// Body of `POST /api/auth/register`.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub captcha_id: String,
    pub captcha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Identity confirmed by the backend for the current token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

impl User {
    /// Name to show in status lines, falling back to the email.
    pub fn display_name(&self) -> &str {
        if self.username.is_empty() {
            &self.email
        } else {
            &self.username
        }
    }
}

// Passwords never reach Debug output.
impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("captcha_id", &self.captcha_id)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("captcha_id", &self.captcha_id)
            .finish_non_exhaustive()
    }
}
