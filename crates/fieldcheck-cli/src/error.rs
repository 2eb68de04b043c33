use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldcheck_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Session token cannot be empty")]
    EmptyToken,
    #[error("No pending draft with key '{0}'")]
    DraftNotFound(String),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error(
        "Uploads need a backend. Set FIELDCHECK_API_BASE_URL (a .env file works) and run `fieldcheck auth set-token <TOKEN>`."
    )]
    BackendNotConfigured,
}
