use fieldcheck_core::config::EngineConfig;

use crate::commands::common::{format_pending_lines, open_store, pending_items};
use crate::error::CliError;

pub async fn run_pending(config: &EngineConfig, as_json: bool) -> Result<(), CliError> {
    let store = open_store(config)?;
    let records = store.pending_records().await?;
    let items = pending_items(&records, &config.retry);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No pending drafts.");
        return Ok(());
    }

    for line in format_pending_lines(&items) {
        println!("{line}");
    }
    Ok(())
}
