//! Draft record model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::photo::PhotoMap;

/// Suffix used in place of a server record id for drafts not yet created remotely.
const NEW_RECORD_SUFFIX: &str = "new";

/// Identifier of the checklist template-instance being answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    /// Create a scope key, rejecting blank values.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(Error::InvalidInput("Scope key cannot be empty".to_string()));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ScopeKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Primary key of the draft store: `<scopeKey>_<serverRecordId | "new">`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeKey(String);

impl CompositeKey {
    #[must_use]
    pub fn new(scope_key: &ScopeKey, server_record_id: Option<&str>) -> Self {
        let suffix = server_record_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(NEW_RECORD_SUFFIX);
        Self(format!("{scope_key}_{suffix}"))
    }

    /// Key for a draft that has no server-side record yet.
    #[must_use]
    pub fn unsynced(scope_key: &ScopeKey) -> Self {
        Self::new(scope_key, None)
    }

    /// Wrap an already-built key (as stored or typed by an operator).
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.contains('_') {
            return Err(Error::InvalidInput(format!(
                "Draft key must look like <scope>_<id|new>, got '{raw}'"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single answer value as captured by the form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    Text(String),
    Boolean(bool),
    Number(f64),
    Choice(String),
}

impl AnswerValue {
    /// Blank text or choice values do not count as answered.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) | Self::Choice(value) => value.trim().is_empty(),
            Self::Boolean(_) => false,
            Self::Number(value) => !value.is_finite(),
        }
    }
}

/// Answer to one question of the checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
}

/// Device location captured with the draft.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

/// Storable form of an in-progress checklist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    #[serde(default)]
    pub photos: PhotoMap,
}

impl DraftPayload {
    /// Number of serialized answers; the reconciliation heuristic compares these.
    #[must_use]
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }

    /// Total photo references across all slots.
    #[must_use]
    pub fn photo_count(&self) -> usize {
        self.photos.values().map(Vec::len).sum()
    }
}

/// The unit of durability: one locally persisted draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftRecord {
    pub scope_key: ScopeKey,
    /// Server-assigned id; `None` until the draft exists remotely.
    pub server_record_id: Option<String>,
    pub payload: DraftPayload,
    /// Last local save (Unix ms).
    pub captured_at_ms: i64,
    /// Failed upload attempts since the last local save.
    pub retry_count: u32,
    /// Time of the last failed upload attempt (Unix ms).
    pub last_attempt_at_ms: Option<i64>,
    /// Store-assigned version, strictly increasing across all saves; 0 until stored.
    #[serde(default)]
    pub revision: i64,
}

impl DraftRecord {
    /// Create a freshly saved record (retry budget reset).
    #[must_use]
    pub fn new(scope_key: ScopeKey, server_record_id: Option<String>, payload: DraftPayload) -> Self {
        Self {
            scope_key,
            server_record_id: server_record_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            payload,
            captured_at_ms: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
            last_attempt_at_ms: None,
            revision: 0,
        }
    }

    #[must_use]
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(&self.scope_key, self.server_record_id.as_deref())
    }
}
