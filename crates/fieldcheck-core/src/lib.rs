//! fieldcheck-core - offline-first checklist draft sync
//!
//! Drafts are written to a local `SQLite` store on every save, their photos
//! are copied into durable app storage, and a single coordinator uploads the
//! pending set whenever connectivity returns or the user asks for it.

pub mod api;
pub mod config;
pub mod credentials;
pub mod db;
pub mod draft;
pub mod engine;
pub mod error;
pub mod models;
pub mod outcome;
pub mod reconcile;
pub mod services;
pub mod storage;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use outcome::Outcome;
