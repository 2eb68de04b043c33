//! Session token persistence.
//!
//! The engine only reads the token; hosts decide where it lives (OS keychain
//! for the CLI, an in-memory slot for tests and embedded callers).

use std::sync::{Arc, Mutex};

use crate::util::normalize_text_option;
use crate::{Error, Result};

pub trait CredentialStore: Clone + Send + Sync + 'static {
    fn load_token(&self) -> Result<Option<String>>;
    fn save_token(&self, token: &str) -> Result<()>;
    fn clear_token(&self) -> Result<()>;
}

/// Process-local token slot.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    token: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let present = self.token.lock().map(|token| token.is_some()).unwrap_or(false);
        formatter
            .debug_struct("MemoryCredentialStore")
            .field("token", if present { &"[REDACTED]" } else { &"None" })
            .finish()
    }
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(Mutex::new(normalize_text_option(Some(token.into())))),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load_token(&self) -> Result<Option<String>> {
        let guard = self
            .token
            .lock()
            .map_err(|error| Error::Credential(error.to_string()))?;
        Ok(guard.clone())
    }

    fn save_token(&self, token: &str) -> Result<()> {
        let token = normalize_text_option(Some(token.to_string()))
            .ok_or_else(|| Error::InvalidInput("token must not be empty".to_string()))?;
        let mut guard = self
            .token
            .lock()
            .map_err(|error| Error::Credential(error.to_string()))?;
        *guard = Some(token);
        Ok(())
    }

    fn clear_token(&self) -> Result<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|error| Error::Credential(error.to_string()))?;
        *guard = None;
        Ok(())
    }
}

/// Token required for an outgoing request; absent or blank is an error.
pub fn require_token(store: &impl CredentialStore) -> Result<String> {
    store
        .load_token()?
        .and_then(|token| normalize_text_option(Some(token)))
        .ok_or(Error::MissingCredential)
}
