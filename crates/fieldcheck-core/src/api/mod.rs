//! Backend surface used by reconciliation and the sync executor.

mod http;

pub use http::HttpChecklistApi;

use crate::draft::UploadFields;
use crate::models::{ScopeKey, ScopeSnapshot};
use crate::Result;

/// One binary part of a draft upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Multipart field name, e.g. `photos[gate]` or `signature`.
    pub part_name: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Complete upsert request: text fields plus files.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftUpload {
    pub fields: UploadFields,
    pub files: Vec<UploadFile>,
}

impl DraftUpload {
    /// Number of photo parts (excludes signature and selfie).
    #[must_use]
    pub fn photo_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.part_name.starts_with("photos["))
            .count()
    }
}

/// Multipart field name of a photo slot.
#[must_use]
pub fn photo_part_name(slot: &str) -> String {
    format!("photos[{slot}]")
}

/// Remote checklist backend.
///
/// Every call carries the session token; the executor resolves it before
/// calling so a missing token never reaches the network.
#[allow(async_fn_in_trait)]
pub trait ChecklistApi {
    /// Scope definition plus the server's current draft, if any.
    async fn fetch_scope(&self, token: &str, scope_key: &ScopeKey) -> Result<ScopeSnapshot>;

    /// Create or update a draft; returns the server record id.
    async fn upsert_draft(&self, token: &str, upload: DraftUpload) -> Result<String>;
}
