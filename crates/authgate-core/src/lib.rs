//! authgate core - bearer-token session management for clients of an
//! authentication backend.
//!
//! - `auth`: tiered credential store and the session state machine
//! - `guard`: navigation guard and router
//! - `api`: HTTP transport and the `AuthBackend` seam
//! - `config`: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;
pub mod utils;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError, AuthBackend};
pub use auth::{CredentialStore, Session, SessionError, SessionSnapshot, SessionStatus};
pub use config::{Config, DurableStore};
pub use guard::{GuardPolicy, Navigation, NavigationError, NavigationGuard, Router};
pub use models::{Captcha, LoginRequest, RegisterRequest, User};
