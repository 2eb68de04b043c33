//! Shared services wrapping the database layer.

mod draft_store;

pub use draft_store::DraftStore;
