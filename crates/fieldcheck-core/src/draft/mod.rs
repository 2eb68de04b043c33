//! In-memory form state, its storable form, and the debounced save path.

mod autosave;
mod serializer;

pub use autosave::{AutosaveHandle, DraftSaver, DraftSession};
pub use serializer::{
    build_upload_fields, decode_payload, encode_payload, FormState, UploadFields,
};
