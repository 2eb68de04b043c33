//! Uploads one stored draft and records the result.

use crate::api::{photo_part_name, ChecklistApi, DraftUpload, UploadFile};
use crate::config::RetryPolicy;
use crate::credentials::{require_token, CredentialStore};
use crate::db::UploadCompletion;
use crate::draft::build_upload_fields;
use crate::models::{DraftRecord, PhotoMap, PhotoReference};
use crate::services::DraftStore;
use crate::storage::{compress_for_upload, jpeg_file_name, CompressedImage, CompressionOptions};
use crate::util::unix_millis_now;
use crate::Result;

/// Result of a single upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAttempt {
    Uploaded {
        server_record_id: String,
        completion: UploadCompletion,
    },
    Failed {
        /// Retry count after this failure; `None` when the record changed meanwhile.
        retry_count: Option<u32>,
        /// No further automatic attempts will be made.
        exhausted: bool,
        reason: String,
    },
}

impl SyncAttempt {
    pub const fn is_uploaded(&self) -> bool {
        matches!(self, Self::Uploaded { .. })
    }
}

pub struct SyncExecutor<A, C> {
    store: DraftStore,
    api: A,
    credentials: C,
    retry: RetryPolicy,
    compression: CompressionOptions,
}

impl<A: ChecklistApi, C: CredentialStore> SyncExecutor<A, C> {
    pub const fn new(
        store: DraftStore,
        api: A,
        credentials: C,
        retry: RetryPolicy,
        compression: CompressionOptions,
    ) -> Self {
        Self {
            store,
            api,
            credentials,
            retry,
            compression,
        }
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub const fn credentials(&self) -> &C {
        &self.credentials
    }

    /// Upload one draft version.
    ///
    /// Remote and credential failures are counted against the record and
    /// reported as `Failed`; only local store errors are returned as `Err`.
    pub async fn sync_one(&self, record: &DraftRecord) -> Result<SyncAttempt> {
        let key = record.composite_key();
        let attempted_at_ms = unix_millis_now();

        match self.upload(record, true, Vec::new()).await {
            Ok(server_record_id) => {
                let completion = self.store.complete_upload(record, &server_record_id).await?;
                tracing::info!(
                    key = %key,
                    server_record_id = %server_record_id,
                    "Draft uploaded ({:?})",
                    completion
                );
                Ok(SyncAttempt::Uploaded {
                    server_record_id,
                    completion,
                })
            }
            Err(error) => {
                let retry_count = self.store.record_failure(record, attempted_at_ms).await?;
                let exhausted = retry_count.is_some_and(|count| self.retry.is_exhausted(count));
                if exhausted {
                    tracing::warn!(
                        key = %key,
                        "Draft upload failed, retry budget exhausted; waiting for manual sync: {}",
                        error
                    );
                } else {
                    tracing::warn!(key = %key, retry_count = ?retry_count, "Draft upload failed: {}", error);
                }
                Ok(SyncAttempt::Failed {
                    retry_count,
                    exhausted,
                    reason: error.to_string(),
                })
            }
        }
    }

    /// Submit the draft as final with signature and supervisor selfie.
    ///
    /// Errors are returned to the caller and the draft stays pending.
    pub async fn finalize(
        &self,
        record: &DraftRecord,
        signature: &PhotoReference,
        selfie: &PhotoReference,
    ) -> Result<String> {
        let signature_bytes = read_local(signature).await?;
        let mut extra = vec![UploadFile {
            part_name: "signature".to_string(),
            file_name: signature.file_name.clone(),
            mime_type: signature.mime_type.clone(),
            bytes: signature_bytes,
        }];
        let selfie_bytes = read_local(selfie).await?;
        extra.push(self.compressed_part("supervisor_selfie".to_string(), selfie, selfie_bytes));

        let server_record_id = self.upload(record, false, extra).await?;
        let completion = self.store.complete_upload(record, &server_record_id).await?;
        tracing::info!(
            key = %record.composite_key(),
            server_record_id = %server_record_id,
            "Draft finalized ({:?})",
            completion
        );
        Ok(server_record_id)
    }

    async fn upload(
        &self,
        record: &DraftRecord,
        is_draft: bool,
        extra_files: Vec<UploadFile>,
    ) -> Result<String> {
        let token = require_token(&self.credentials)?;
        let fields = build_upload_fields(record, is_draft)?;
        let mut files = self.photo_parts(&record.payload.photos).await;
        files.extend(extra_files);

        tracing::debug!(
            key = %record.composite_key(),
            files = files.len(),
            is_draft,
            "Uploading draft"
        );
        self.api.upsert_draft(&token, DraftUpload { fields, files }).await
    }

    /// One compressed part per local photo, in slot order.
    ///
    /// Remote references are already on the server and are not re-sent.
    async fn photo_parts(&self, photos: &PhotoMap) -> Vec<UploadFile> {
        let mut files = Vec::new();
        for (slot, references) in photos {
            for photo in references.iter().filter(|photo| !photo.is_remote()) {
                match read_local(photo).await {
                    Ok(bytes) => files.push(self.compressed_part(photo_part_name(slot), photo, bytes)),
                    Err(error) => {
                        tracing::warn!("Omitting unreadable photo {} from upload: {}", photo.uri, error);
                    }
                }
            }
        }
        files
    }

    fn compressed_part(&self, part_name: String, photo: &PhotoReference, bytes: Vec<u8>) -> UploadFile {
        match compress_for_upload(&bytes, self.compression) {
            Ok(CompressedImage { bytes, .. }) => UploadFile {
                part_name,
                file_name: jpeg_file_name(&photo.file_name),
                mime_type: CompressedImage::MIME_TYPE.to_string(),
                bytes,
            },
            Err(error) => {
                tracing::warn!("Sending {} uncompressed: {}", photo.uri, error);
                UploadFile {
                    part_name,
                    file_name: photo.file_name.clone(),
                    mime_type: photo.mime_type.clone(),
                    bytes,
                }
            }
        }
    }
}

async fn read_local(photo: &PhotoReference) -> Result<Vec<u8>> {
    let path = photo.local_path().ok_or_else(|| {
        crate::Error::InvalidInput(format!("{} is not a local file", photo.uri))
    })?;
    Ok(tokio::fs::read(path).await?)
}
