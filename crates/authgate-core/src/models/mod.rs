//! Data models exchanged with the authentication backend.
//!
//! - `Captcha`: challenge issued before login/register
//! - `LoginRequest`, `RegisterRequest`: credential payloads
//! - `TokenResponse`: bearer token issued on success
//! - `User`: the verified identity returned by `/api/auth/me`

pub mod auth;

pub use auth::{Captcha, LoginRequest, RegisterRequest, TokenResponse, User};
