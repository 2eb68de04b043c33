//! Data models for fieldcheck

mod draft;
mod photo;
mod scope;
mod status;

pub use draft::{Answer, AnswerValue, CompositeKey, DraftPayload, DraftRecord, GeoLocation, ScopeKey};
pub use photo::{PhotoMap, PhotoReference};
pub use scope::{QuestionDefinition, ScopeDefinition, ScopeSnapshot, ServerDraft};
pub use status::{SyncState, SyncStatus};
