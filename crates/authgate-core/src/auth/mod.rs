//! Authentication module for managing the bearer-token session.
//!
//! This module provides:
//! - `CredentialStore`: tiered token persistence (durable file or OS keychain,
//!   ephemeral in-process slot), one active tier at a time
//! - `Session`: in-memory session state with single-flight verification
//!   against the backend's `/me` endpoint

pub mod credentials;
pub mod session;

pub use credentials::{CredentialStore, FileSlot, KeyringSlot, MemorySlot, Tier, TokenSlot};
pub use session::{
    Session, SessionError, SessionSnapshot, SessionStatus, DEFAULT_VERIFY_TIMEOUT,
};
