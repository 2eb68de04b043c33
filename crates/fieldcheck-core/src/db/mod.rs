//! Database layer for fieldcheck

mod connection;
mod draft_repository;
mod migrations;
mod scope_cache_repository;

pub use connection::Database;
pub use draft_repository::{DraftRepository, SqliteDraftRepository, UploadCompletion};
pub use scope_cache_repository::{ScopeCacheRepository, SqliteScopeCacheRepository};
