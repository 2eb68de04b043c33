//! Photo reference model

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::util::is_http_url;

/// Logical photo-slot name mapped to its ordered photo references.
pub type PhotoMap = BTreeMap<String, Vec<PhotoReference>>;

/// Pointer to a captured or uploaded photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoReference {
    /// Local path, `file://` URI or remote URL.
    pub uri: String,
    pub mime_type: String,
    pub file_name: String,
}

impl PhotoReference {
    pub fn new(
        uri: impl Into<String>,
        mime_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Build a reference for an already-uploaded photo served by the backend.
    #[must_use]
    pub fn remote(url: &str) -> Self {
        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("photo.jpg")
            .to_string();
        let mime_type = mime_guess::from_path(&file_name)
            .first_or(mime_guess::mime::IMAGE_JPEG)
            .essence_str()
            .to_string();
        Self {
            uri: url.to_string(),
            mime_type,
            file_name,
        }
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        is_http_url(self.uri.trim())
    }

    /// Filesystem path for local references; `None` for remote URLs.
    #[must_use]
    pub fn local_path(&self) -> Option<PathBuf> {
        let uri = self.uri.trim();
        if uri.is_empty() || is_http_url(uri) {
            return None;
        }
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Some(PathBuf::from(path))
    }
}
