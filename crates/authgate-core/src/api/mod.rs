//! REST client module for the authentication backend.
//!
//! `ApiClient` talks to the captcha/login/register/me endpoints over HTTP.
//! The session never depends on it directly: it consumes the `AuthBackend`
//! trait, which `ApiClient` implements and tests replace with a mock.

pub mod backend;
pub mod client;
pub mod error;

pub use backend::AuthBackend;
pub use client::ApiClient;
pub use error::ApiError;
