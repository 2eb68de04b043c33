use fieldcheck_core::config::EngineConfig;

use crate::commands::common::{open_store, parse_draft_key};
use crate::error::CliError;

pub async fn run_discard(config: &EngineConfig, raw_key: &str) -> Result<(), CliError> {
    let key = parse_draft_key(raw_key)?;
    let store = open_store(config)?;

    if !store.delete(&key).await? {
        return Err(CliError::DraftNotFound(key.to_string()));
    }
    tracing::info!(key = %key, "Discarded pending draft");
    println!("{key}");
    Ok(())
}
