use fieldcheck_core::config::EngineConfig;

use crate::commands::common::{build_status, format_status_lines, open_store};
use crate::error::CliError;

pub async fn run_status(config: &EngineConfig, as_json: bool) -> Result<(), CliError> {
    let store = open_store(config)?;
    let records = store.pending_records().await?;
    let report = build_status(&records, config);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}
