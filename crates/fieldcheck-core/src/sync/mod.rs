//! Upload path: executor, flush coordinator and connectivity watcher.

mod connectivity;
mod executor;
mod queue;

pub use connectivity::{ConnectivityWatcher, NetworkEvent};
pub use executor::{SyncAttempt, SyncExecutor};
pub use queue::{FlushMode, FlushOutcome, FlushReport, SyncQueue};
