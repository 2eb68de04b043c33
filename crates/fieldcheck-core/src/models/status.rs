//! Sync status published to UI badges.

use serde::{Deserialize, Serialize};

/// Coarse sync state for badges and indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Offline,
    Syncing,
    Pending,
    Synced,
}

/// Snapshot published on every network event and at flush start/end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub pending_syncs: usize,
    pub is_syncing: bool,
}

impl SyncStatus {
    #[must_use]
    pub const fn state(&self) -> SyncState {
        if self.is_syncing {
            SyncState::Syncing
        } else if !self.is_online {
            SyncState::Offline
        } else if self.pending_syncs > 0 {
            SyncState::Pending
        } else {
            SyncState::Synced
        }
    }
}
