//! Tiered bearer-token persistence.
//!
//! The store keeps an ordered list of tiers, durable first. Reads walk the
//! tiers in that order and return the first non-empty token. Writes clear
//! every tier before writing the chosen one, so at most one tier holds a
//! token at any time.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::utils::mask_token;

/// Keychain service name for the keyring-backed tier
const SERVICE_NAME: &str = "authgate";

/// Keychain account name under which the token is stored
const KEYRING_ACCOUNT: &str = "bearer-token";

/// Token file name inside the data directory
const TOKEN_FILE: &str = "token.json";

/// Which persistence tier a token lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Survives process restarts.
    Durable,
    /// Lives only as long as the current process.
    Ephemeral,
}

impl Tier {
    pub fn for_remember(remember: bool) -> Self {
        if remember {
            Tier::Durable
        } else {
            Tier::Ephemeral
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Durable => write!(f, "durable"),
            Tier::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// A single named storage slot for the token.
pub trait TokenSlot: Send + Sync {
    /// Current value, `None` when the slot is empty.
    fn read(&self) -> Result<Option<String>>;
    fn write(&self, token: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// ============================================================================
// Slot implementations
// ============================================================================

/// In-process slot. Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemorySlot {
    value: Arc<Mutex<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>> {
        let value = self.value.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(value.clone())
    }

    fn write(&self, token: &str) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: String,
    stored_at: DateTime<Utc>,
}

/// Token persisted as JSON in a file.
pub struct FileSlot {
    path: PathBuf,
}

impl FileSlot {
    /// Slot stored as `token.json` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenSlot for FileSlot {
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read token file")?;
        let stored: StoredToken = serde_json::from_str(&contents)
            .context("Failed to parse token file")?;
        Ok(Some(stored.token))
    }

    fn write(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredToken {
            token: token.to_string(),
            stored_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .context("Failed to open token file")?;
        // `mode` only applies on creation; tighten a file left by an older version.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict token file permissions")?;
        }
        file.write_all(contents.as_bytes())
            .context("Failed to write token file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        }
        Ok(())
    }
}

/// Token kept in the OS keychain.
pub struct KeyringSlot {
    account: String,
}

impl KeyringSlot {
    pub fn new() -> Self {
        Self::with_account(KEYRING_ACCOUNT)
    }

    /// Slot under a custom keychain account name
    pub fn with_account(account: &str) -> Self {
        Self {
            account: account.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account).context("Failed to create keyring entry")
    }
}

impl Default for KeyringSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSlot for KeyringSlot {
    fn read(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn write(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Ordered set of token tiers. Only the session touches it.
pub struct CredentialStore {
    tiers: Vec<(Tier, Box<dyn TokenSlot>)>,
}

impl CredentialStore {
    /// Build a store from a durable and an ephemeral slot. The durable tier
    /// always has priority on load.
    pub fn new(durable: Box<dyn TokenSlot>, ephemeral: Box<dyn TokenSlot>) -> Self {
        Self {
            tiers: vec![(Tier::Durable, durable), (Tier::Ephemeral, ephemeral)],
        }
    }

    /// Both tiers in memory. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemorySlot::new()), Box::new(MemorySlot::new()))
    }

    /// Durable token file under `dir`, ephemeral tier in memory.
    pub fn with_file(dir: &Path) -> Self {
        Self::new(Box::new(FileSlot::in_dir(dir)), Box::new(MemorySlot::new()))
    }

    /// Durable token in the OS keychain, ephemeral tier in memory.
    pub fn with_keyring() -> Self {
        Self::new(Box::new(KeyringSlot::new()), Box::new(MemorySlot::new()))
    }

    /// First non-empty token in tier order, or an empty string.
    pub fn load(&self) -> String {
        for (tier, slot) in &self.tiers {
            match slot.read() {
                Ok(Some(token)) if !token.is_empty() => {
                    debug!(%tier, token = %mask_token(&token), "Loaded token");
                    return token;
                }
                Ok(_) => {}
                Err(e) => warn!(%tier, error = %e, "Failed to read token tier"),
            }
        }
        String::new()
    }

    /// Clear every tier, then write `token` into the durable or ephemeral tier.
    pub fn save(&self, token: &str, durable: bool) {
        self.clear();

        let target = Tier::for_remember(durable);
        for (tier, slot) in &self.tiers {
            if *tier == target {
                if let Err(e) = slot.write(token) {
                    warn!(%tier, error = %e, "Failed to persist token");
                }
            }
        }
    }

    /// Empty every tier.
    pub fn clear(&self) {
        for (tier, slot) in &self.tiers {
            if let Err(e) = slot.clear() {
                warn!(%tier, error = %e, "Failed to clear token tier");
            }
        }
    }
}
