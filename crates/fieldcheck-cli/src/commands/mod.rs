pub mod auth;
pub mod common;
pub mod completions;
pub mod discard;
pub mod pending;
pub mod retry;
pub mod status;
pub mod sync;
