//! Error types for fieldcheck-core

use thiserror::Error;

/// Result type alias using fieldcheck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldcheck-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport-level HTTP failure (no response received)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Draft or scope not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The backend could not be reached and no local fallback applies
    #[error("Offline: {0}")]
    Offline(String),

    /// No session credential is available for an outgoing request
    #[error("No session credential available")]
    MissingCredential,

    /// Secure credential storage failure
    #[error("Credential storage error: {0}")]
    Credential(String),

    /// Image decode/encode failure
    #[error("Image error: {0}")]
    Image(String),

    /// A background task (autosave, watcher) is no longer running
    #[error("Background task stopped: {0}")]
    TaskStopped(&'static str),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the failure came from the network or the server rather than local state.
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Api { .. } | Self::Offline(_) | Self::MissingCredential
        )
    }
}
