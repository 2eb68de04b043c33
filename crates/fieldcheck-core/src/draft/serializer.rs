//! Draft serialization between form state, stored payload and upload body.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{
    Answer, AnswerValue, DraftPayload, DraftRecord, GeoLocation, PhotoMap, PhotoReference,
    ServerDraft,
};
use crate::util::normalize_text_option;
use crate::Result;

/// What the supervisor is currently editing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    /// Answers keyed by question id.
    pub answers: BTreeMap<String, AnswerValue>,
    pub notes: String,
    pub location: Option<GeoLocation>,
    pub photos: PhotoMap,
}

impl FormState {
    /// Record or replace an answer.
    pub fn answer(&mut self, question_id: impl Into<String>, value: AnswerValue) {
        self.answers.insert(question_id.into(), value);
    }

    /// Append a photo to a slot.
    pub fn attach_photo(&mut self, slot: impl Into<String>, photo: PhotoReference) {
        self.photos.entry(slot.into()).or_default().push(photo);
    }

    /// Storable payload; blank answers and empty photo slots are left out.
    #[must_use]
    pub fn to_payload(&self) -> DraftPayload {
        let answers = self
            .answers
            .iter()
            .filter(|(_, value)| !value.is_blank())
            .map(|(question_id, value)| Answer {
                question_id: question_id.clone(),
                value: value.clone(),
            })
            .collect();

        let photos = self
            .photos
            .iter()
            .filter(|(_, references)| !references.is_empty())
            .map(|(slot, references)| (slot.clone(), references.clone()))
            .collect();

        DraftPayload {
            answers,
            notes: normalize_text_option(Some(self.notes.clone())),
            location: self.location,
            photos,
        }
    }

    /// Rebuild the form from a stored payload.
    #[must_use]
    pub fn from_payload(payload: &DraftPayload) -> Self {
        Self {
            answers: payload
                .answers
                .iter()
                .map(|answer| (answer.question_id.clone(), answer.value.clone()))
                .collect(),
            notes: payload.notes.clone().unwrap_or_default(),
            location: payload.location,
            photos: payload.photos.clone(),
        }
    }

    /// Rebuild the form from the server's copy of the draft.
    #[must_use]
    pub fn from_server_draft(draft: &ServerDraft) -> Self {
        Self {
            answers: draft
                .answers
                .iter()
                .map(|answer| (answer.question_id.clone(), answer.value.clone()))
                .collect(),
            notes: draft.observations.clone().unwrap_or_default(),
            location: draft.location,
            photos: remote_photo_map(&draft.photos),
        }
    }

    /// Replace slots with the server's uploaded photos; other slots are kept.
    pub fn overlay_remote_photos(&mut self, urls: &BTreeMap<String, Vec<String>>) {
        for (slot, references) in remote_photo_map(urls) {
            self.photos.insert(slot, references);
        }
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|value| !value.is_blank()).count()
    }
}

fn remote_photo_map(urls: &BTreeMap<String, Vec<String>>) -> PhotoMap {
    urls.iter()
        .filter(|(_, urls)| !urls.is_empty())
        .map(|(slot, urls)| {
            (
                slot.clone(),
                urls.iter().map(|url| PhotoReference::remote(url)).collect(),
            )
        })
        .collect()
}

/// Encode a payload for storage.
pub fn encode_payload(payload: &DraftPayload) -> Result<String> {
    Ok(serde_json::to_string(payload)?)
}

/// Decode a stored payload.
pub fn decode_payload(raw: &str) -> Result<DraftPayload> {
    Ok(serde_json::from_str(raw)?)
}

/// Text fields of the draft upsert request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFields {
    pub scope_key: String,
    pub server_record_id: Option<String>,
    pub is_draft: bool,
    pub observations: String,
    /// JSON-encoded answer list.
    pub answers: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub accuracy: Option<f64>,
}

impl UploadFields {
    /// Flatten into multipart text parts, skipping absent values.
    #[must_use]
    pub fn into_parts(self) -> Vec<(&'static str, String)> {
        let mut parts = vec![("scope_key", self.scope_key)];
        if let Some(id) = self.server_record_id {
            parts.push(("server_record_id", id));
        }
        parts.push(("is_draft", self.is_draft.to_string()));
        parts.push(("observations", self.observations));
        parts.push(("answers", self.answers));
        if let Some(lat) = self.lat {
            parts.push(("lat", lat.to_string()));
        }
        if let Some(lng) = self.lng {
            parts.push(("lng", lng.to_string()));
        }
        if let Some(accuracy) = self.accuracy {
            parts.push(("accuracy", accuracy.to_string()));
        }
        parts
    }
}

/// Build the text part of an upload from a stored record.
pub fn build_upload_fields(record: &DraftRecord, is_draft: bool) -> Result<UploadFields> {
    let payload = &record.payload;
    Ok(UploadFields {
        scope_key: record.scope_key.to_string(),
        server_record_id: record.server_record_id.clone(),
        is_draft,
        observations: payload.notes.clone().unwrap_or_default(),
        answers: serde_json::to_string(&payload.answers)?,
        lat: payload.location.map(|location| location.lat),
        lng: payload.location.map(|location| location.lng),
        accuracy: payload.location.and_then(|location| location.accuracy),
    })
}
