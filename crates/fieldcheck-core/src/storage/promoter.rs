//! Photo durability promotion.
//!
//! Camera and gallery output lives in cache paths the OS may reclaim at any
//! time. Before a draft referencing such photos is persisted, each local
//! reference is copied under `<root>/<scope>/` with a deterministic name.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::models::{PhotoMap, PhotoReference, ScopeKey};
use crate::outcome::Outcome;
use crate::util::{is_http_url, sanitize_token};

const DEFAULT_EXTENSION: &str = "jpg";

/// Copies ephemeral photo references into durable per-scope storage.
#[derive(Debug, Clone)]
pub struct PhotoPromoter {
    root: PathBuf,
}

impl PhotoPromoter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Durable directory for one scope.
    #[must_use]
    pub fn scope_dir(&self, scope_key: &ScopeKey) -> PathBuf {
        self.root.join(sanitize_token(scope_key.as_str(), "scope"))
    }

    /// Remote URLs and files already under the durable root need no copy.
    #[must_use]
    pub fn is_durable(&self, photo: &PhotoReference) -> bool {
        if photo.is_remote() {
            return true;
        }
        photo
            .local_path()
            .is_some_and(|path| path.starts_with(&self.root))
    }

    /// Promote every ephemeral reference in `photos`.
    ///
    /// Items are processed one at a time. A failed copy keeps the original
    /// reference for that item and is reported in `Outcome::Degraded`.
    pub async fn promote(&self, scope_key: &ScopeKey, photos: &PhotoMap) -> Outcome<PhotoMap> {
        let scope_dir = self.scope_dir(scope_key);
        let mut reserved: HashSet<PathBuf> = photos
            .values()
            .flatten()
            .filter(|photo| self.is_durable(photo))
            .filter_map(PhotoReference::local_path)
            .collect();

        let mut promoted = PhotoMap::new();
        let mut reasons = Vec::new();

        for (slot, references) in photos {
            let slot_name = sanitize_token(slot, "photo");
            let mut slot_promoted = Vec::with_capacity(references.len());

            for (index, photo) in references.iter().enumerate() {
                if self.is_durable(photo) {
                    slot_promoted.push(photo.clone());
                    continue;
                }

                let target = free_target(&scope_dir, &slot_name, index, &extension_for(photo), &reserved);
                match copy_into(photo, &target).await {
                    Ok(()) => {
                        tracing::debug!(
                            slot = %slot,
                            index,
                            "Promoted photo to {}",
                            target.display()
                        );
                        let file_name = target
                            .file_name()
                            .map_or_else(|| photo.file_name.clone(), |name| name.to_string_lossy().to_string());
                        slot_promoted.push(PhotoReference {
                            uri: target.to_string_lossy().to_string(),
                            mime_type: photo.mime_type.clone(),
                            file_name,
                        });
                        reserved.insert(target);
                    }
                    Err(error) => {
                        tracing::warn!(
                            slot = %slot,
                            index,
                            "Keeping original photo reference {}: {}",
                            photo.uri,
                            error
                        );
                        reasons.push(format!("{slot}[{index}]: {error}"));
                        slot_promoted.push(photo.clone());
                    }
                }
            }

            promoted.insert(slot.clone(), slot_promoted);
        }

        Outcome::from_reasons(promoted, reasons)
    }

    /// Whether a reference still resolves; remote URLs always do.
    pub async fn exists(&self, uri: &str) -> bool {
        let uri = uri.trim();
        if uri.is_empty() {
            return false;
        }
        if is_http_url(uri) {
            return true;
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Drop references whose files are gone; returns the pruned map and the dropped URIs.
    pub async fn prune_missing(&self, photos: PhotoMap) -> (PhotoMap, Vec<String>) {
        let mut kept = PhotoMap::new();
        let mut dropped = Vec::new();

        for (slot, references) in photos {
            let mut survivors = Vec::with_capacity(references.len());
            for photo in references {
                if self.exists(&photo.uri).await {
                    survivors.push(photo);
                } else {
                    dropped.push(photo.uri);
                }
            }
            if !survivors.is_empty() {
                kept.insert(slot, survivors);
            }
        }

        (kept, dropped)
    }
}

/// `<slot>_<index>.<ext>`, or `<slot>_<index>-<n>.<ext>` when that name is
/// still referenced by another durable photo of the same draft.
fn free_target(
    scope_dir: &Path,
    slot_name: &str,
    index: usize,
    extension: &str,
    reserved: &HashSet<PathBuf>,
) -> PathBuf {
    let candidate = scope_dir.join(format!("{slot_name}_{index}.{extension}"));
    if !reserved.contains(&candidate) {
        return candidate;
    }
    (1..)
        .map(|n| scope_dir.join(format!("{slot_name}_{index}-{n}.{extension}")))
        .find(|path| !reserved.contains(path))
        .unwrap_or(candidate)
}

fn extension_for(photo: &PhotoReference) -> String {
    let from_name = [Some(PathBuf::from(photo.file_name.trim())), photo.local_path()]
        .into_iter()
        .flatten()
        .find_map(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| sanitize_token(ext, "").to_ascii_lowercase())
                .filter(|ext| !ext.is_empty())
        });
    if let Some(ext) = from_name {
        return ext;
    }

    mime_guess::get_mime_extensions_str(photo.mime_type.trim())
        .and_then(|extensions| {
            extensions
                .iter()
                .find(|ext| matches!(**ext, "jpg" | "png" | "webp" | "heic" | "gif"))
                .or_else(|| extensions.first())
        })
        .map_or_else(|| DEFAULT_EXTENSION.to_string(), |ext| (*ext).to_string())
}

async fn copy_into(photo: &PhotoReference, target: &Path) -> std::io::Result<()> {
    let source = photo.local_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "photo has no local path")
    })?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Copy under a staging name so an interrupted copy never shows up as a
    // durable photo.
    let staging = target.with_extension(format!("{}.part", uuid::Uuid::now_v7().simple()));
    tokio::fs::copy(&source, &staging).await?;
    if let Err(error) = tokio::fs::rename(&staging, target).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(error);
    }
    Ok(())
}
