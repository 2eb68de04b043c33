use fieldcheck_core::config::EngineConfig;

use crate::commands::common::{describe_flush, open_engine};
use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

pub async fn run_sync(
    config: EngineConfig,
    credentials: KeyringCredentialStore,
) -> Result<(), CliError> {
    let engine = open_engine(config, credentials)?;
    let outcome = engine.sync_now().await?;
    tracing::info!("Manual sync: {:?}", outcome);
    println!("{}", describe_flush(&outcome));
    Ok(())
}
