//! In-memory fakes shared by the async tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::api::{ChecklistApi, DraftUpload};
use crate::models::{ScopeKey, ScopeSnapshot};
use crate::{Error, Result};

#[derive(Default)]
struct FakeState {
    snapshots: HashMap<String, ScopeSnapshot>,
    uploads: Vec<(String, DraftUpload)>,
    failing: bool,
    offline: bool,
    next_id: u32,
}

/// Scriptable backend: records every upload and can fail or go offline.
#[derive(Clone, Default)]
pub(crate) struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub(crate) fn insert_snapshot(&self, scope_key: &str, snapshot: ScopeSnapshot) {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .insert(scope_key.to_string(), snapshot);
    }

    pub(crate) fn uploads(&self) -> Vec<DraftUpload> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .iter()
            .map(|(_, upload)| upload.clone())
            .collect()
    }

    pub(crate) fn upload_tokens(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .iter()
            .map(|(token, _)| token.clone())
            .collect()
    }
}

impl ChecklistApi for FakeApi {
    async fn fetch_scope(&self, _token: &str, scope_key: &ScopeKey) -> Result<ScopeSnapshot> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Offline("fake backend unreachable".to_string()));
        }
        state
            .snapshots
            .get(scope_key.as_str())
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: format!("unknown scope {scope_key}"),
            })
    }

    async fn upsert_draft(&self, token: &str, upload: DraftUpload) -> Result<String> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(Error::Offline("fake backend unreachable".to_string()));
        }
        if state.failing {
            return Err(Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        state.next_id += 1;
        let id = upload
            .fields
            .server_record_id
            .clone()
            .unwrap_or_else(|| format!("srv-{}", state.next_id));
        state.uploads.push((token.to_string(), upload));
        Ok(id)
    }
}
