//! Scope definition and server draft models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::draft::{Answer, GeoLocation};

/// One question of a checklist template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub kind: String,
}

/// Checklist template bound to a site/unit, as served by the backend.
///
/// Unknown fields are preserved so the cached copy round-trips intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeDefinition {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub questions: Vec<QuestionDefinition>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Draft as stored on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDraft {
    pub id: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub observations: Option<String>,
    #[serde(default)]
    pub location: Option<GeoLocation>,
    /// Slot name to already-uploaded photo URLs.
    #[serde(default)]
    pub photos: BTreeMap<String, Vec<String>>,
}

impl ServerDraft {
    #[must_use]
    pub fn answer_count(&self) -> usize {
        self.answers.len()
    }
}

/// Response of the scope fetch: template plus the server's current draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
    pub definition: ScopeDefinition,
    #[serde(default)]
    pub server_draft: Option<ServerDraft>,
}
