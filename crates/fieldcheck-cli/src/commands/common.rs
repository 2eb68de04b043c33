use std::path::PathBuf;

use chrono::Utc;
use fieldcheck_core::api::HttpChecklistApi;
use fieldcheck_core::config::{EngineConfig, RetryPolicy};
use fieldcheck_core::models::{CompositeKey, DraftRecord};
use fieldcheck_core::services::DraftStore;
use fieldcheck_core::sync::FlushOutcome;
use fieldcheck_core::SyncEngine;
use serde::Serialize;

use crate::credentials::KeyringCredentialStore;
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct PendingDraftItem {
    pub key: String,
    pub scope_key: String,
    pub server_record_id: Option<String>,
    pub answers: usize,
    pub photos: usize,
    pub retry_count: u32,
    pub exhausted: bool,
    pub captured_at: i64,
    pub captured_at_iso: String,
    pub relative_time: String,
    pub last_attempt_at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub pending_syncs: usize,
    /// Drafts past the retry cap; only a manual sync will upload them.
    pub exhausted: usize,
    pub retry_limit: u32,
    pub data_dir: String,
    pub api_base_url: Option<String>,
}

pub fn resolve_config(data_dir: Option<PathBuf>) -> Result<EngineConfig, CliError> {
    let mut config = EngineConfig::from_env()?;
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

pub fn open_store(config: &EngineConfig) -> Result<DraftStore, CliError> {
    Ok(DraftStore::open_path(config.database_path())?)
}

pub fn open_engine(
    config: EngineConfig,
    credentials: KeyringCredentialStore,
) -> Result<SyncEngine<HttpChecklistApi, KeyringCredentialStore>, CliError> {
    if config.api_base_url.is_none() {
        return Err(CliError::BackendNotConfigured);
    }
    Ok(SyncEngine::open(config, credentials)?)
}

pub fn parse_draft_key(raw: &str) -> Result<CompositeKey, CliError> {
    Ok(CompositeKey::parse(raw)?)
}

pub fn pending_item(record: &DraftRecord, retry: &RetryPolicy, now_ms: i64) -> PendingDraftItem {
    PendingDraftItem {
        key: record.composite_key().to_string(),
        scope_key: record.scope_key.to_string(),
        server_record_id: record.server_record_id.clone(),
        answers: record.payload.answer_count(),
        photos: record.payload.photo_count(),
        retry_count: record.retry_count,
        exhausted: retry.is_exhausted(record.retry_count),
        captured_at: record.captured_at_ms,
        captured_at_iso: format_timestamp(record.captured_at_ms),
        relative_time: format_relative_time(record.captured_at_ms, now_ms),
        last_attempt_at: record.last_attempt_at_ms,
    }
}

pub fn pending_items(records: &[DraftRecord], retry: &RetryPolicy) -> Vec<PendingDraftItem> {
    let now_ms = Utc::now().timestamp_millis();
    records
        .iter()
        .map(|record| pending_item(record, retry, now_ms))
        .collect()
}

pub fn build_status(records: &[DraftRecord], config: &EngineConfig) -> StatusReport {
    StatusReport {
        pending_syncs: records.len(),
        exhausted: records
            .iter()
            .filter(|record| config.retry.is_exhausted(record.retry_count))
            .count(),
        retry_limit: config.retry.max_attempts,
        data_dir: config.data_dir.display().to_string(),
        api_base_url: config.api_base_url.clone(),
    }
}

pub fn format_pending_lines(items: &[PendingDraftItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let retries = if item.exhausted {
                format!("retries {} (manual sync needed)", item.retry_count)
            } else {
                format!("retries {}", item.retry_count)
            };
            format!(
                "{:<32}  {:>3} answers  {:>2} photos  {:<10}  {}",
                item.key, item.answers, item.photos, item.relative_time, retries
            )
        })
        .collect()
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("Pending drafts: {}", report.pending_syncs),
        format!(
            "Past retry limit ({}): {}",
            report.retry_limit, report.exhausted
        ),
        format!("Data directory: {}", report.data_dir),
    ];
    lines.push(match &report.api_base_url {
        Some(url) => format!("Backend: {url}"),
        None => "Backend: not configured".to_string(),
    });
    lines
}

pub fn describe_flush(outcome: &FlushOutcome) -> String {
    match outcome {
        FlushOutcome::Completed(report) => format!(
            "Uploaded {} draft(s), {} failed, {} skipped",
            report.success, report.failed, report.skipped
        ),
        FlushOutcome::AlreadyRunning => "A sync is already running".to_string(),
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}
