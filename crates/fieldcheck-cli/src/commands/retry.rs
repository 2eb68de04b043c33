use fieldcheck_core::config::EngineConfig;
use fieldcheck_core::Error;

use crate::commands::common::{describe_flush, open_engine, parse_draft_key};
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

pub async fn run_retry(
    config: EngineConfig,
    credentials: KeyringCredentialStore,
    raw_key: &str,
) -> Result<(), CliError> {
    let key = parse_draft_key(raw_key)?;
    let engine = open_engine(config, credentials)?;

    match engine.retry(&key).await {
        Ok(outcome) => {
            tracing::info!(key = %key, "Retried draft: {:?}", outcome);
            println!("{}", describe_flush(&outcome));
            Ok(())
        }
        Err(Error::NotFound(_)) => Err(CliError::DraftNotFound(key.to_string())),
        Err(error) => Err(error.into()),
    }
}
