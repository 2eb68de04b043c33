//! Decides which copy of a draft the form opens with.
//!
//! This is a size heuristic, not a merge: whichever side has at least as
//! many answers wins wholesale. Local wins ties.

use crate::api::{ChecklistApi, DraftUpload};
use crate::credentials::{require_token, CredentialStore};
use crate::draft::{build_upload_fields, DraftSession, FormState};
use crate::models::{CompositeKey, DraftPayload, DraftRecord, ScopeDefinition, ScopeKey, ScopeSnapshot};
use crate::outcome::Outcome;
use crate::services::DraftStore;
use crate::storage::PhotoPromoter;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    Local,
    Server,
    /// Neither side had a draft.
    Fresh,
}

/// Everything the form needs to open.
#[derive(Debug, Clone, PartialEq)]
pub struct Hydration {
    pub source: HydrationSource,
    pub definition: ScopeDefinition,
    pub session: DraftSession,
    pub form: FormState,
}

/// Pick the winning side from the answer counts of whichever drafts exist.
pub const fn choose_source(local_answers: Option<usize>, server_answers: Option<usize>) -> HydrationSource {
    match (local_answers, server_answers) {
        (None, None) => HydrationSource::Fresh,
        (Some(_), None) => HydrationSource::Local,
        (None, Some(_)) => HydrationSource::Server,
        (Some(local), Some(server)) => {
            if local >= server {
                HydrationSource::Local
            } else {
                HydrationSource::Server
            }
        }
    }
}

pub struct Reconciler<'a, A, C> {
    store: &'a DraftStore,
    promoter: &'a PhotoPromoter,
    api: &'a A,
    credentials: &'a C,
}

impl<'a, A: ChecklistApi, C: CredentialStore> Reconciler<'a, A, C> {
    pub const fn new(
        store: &'a DraftStore,
        promoter: &'a PhotoPromoter,
        api: &'a A,
        credentials: &'a C,
    ) -> Self {
        Self {
            store,
            promoter,
            api,
            credentials,
        }
    }

    /// Load the form for a scope, online if possible.
    ///
    /// Offline loads and dropped photos yield `Degraded`; an offline load
    /// with no cached definition is an error.
    pub async fn reconcile(
        &self,
        scope_key: &ScopeKey,
        server_record_id: Option<&str>,
    ) -> Result<Outcome<Hydration>> {
        let fetched = match require_token(self.credentials) {
            Ok(token) => self
                .api
                .fetch_scope(&token, scope_key)
                .await
                .map(|snapshot| (token, snapshot)),
            Err(error) => Err(error),
        };

        match fetched {
            Ok((token, snapshot)) => {
                self.store.cache_scope(scope_key, &snapshot.definition).await?;
                self.reconcile_online(scope_key, server_record_id, &token, snapshot)
                    .await
            }
            Err(error) => {
                tracing::warn!("Loading {} from local state: {}", scope_key, error);
                self.reconcile_offline(scope_key, server_record_id, &error).await
            }
        }
    }

    async fn reconcile_online(
        &self,
        scope_key: &ScopeKey,
        server_record_id: Option<&str>,
        token: &str,
        snapshot: ScopeSnapshot,
    ) -> Result<Outcome<Hydration>> {
        let ScopeSnapshot {
            definition,
            server_draft,
        } = snapshot;
        let record_id = server_record_id
            .map(str::to_string)
            .or_else(|| server_draft.as_ref().map(|draft| draft.id.clone()));

        let local = self
            .store
            .get(&CompositeKey::new(scope_key, record_id.as_deref()))
            .await?;

        let source = choose_source(
            local.as_ref().map(|record| record.payload.answer_count()),
            server_draft.as_ref().map(|draft| draft.answer_count()),
        );
        tracing::debug!(
            scope_key = %scope_key,
            local = ?local.as_ref().map(|record| record.payload.answer_count()),
            server = ?server_draft.as_ref().map(|draft| draft.answer_count()),
            "Hydrating from {:?}",
            source
        );

        match (source, local, server_draft) {
            (HydrationSource::Server, local, Some(draft)) => {
                let mut form = FormState::from_server_draft(&draft);
                let mut reasons = Vec::new();
                if let Some(local) = local {
                    // The server copy is authoritative now; the smaller local
                    // version must not be uploaded over it. A newer save is kept.
                    if self.store.discard_version(&local).await? {
                        tracing::info!(
                            key = %local.composite_key(),
                            "Dropped local draft superseded by server draft"
                        );
                    }
                    let (photos, dropped) = self.promoter.prune_missing(local.payload.photos).await;
                    reasons = missing_photo_reasons(dropped);
                    form.photos = photos;
                    form.overlay_remote_photos(&draft.photos);
                }
                let hydration = Hydration {
                    source,
                    definition,
                    session: DraftSession::new(scope_key.clone(), Some(draft.id)),
                    form,
                };
                Ok(Outcome::from_reasons(hydration, reasons))
            }
            (_, Some(local), _) => Ok(self.hydrate_local(definition, local).await),
            _ => Ok(self.start_fresh(scope_key, definition, token).await),
        }
    }

    async fn reconcile_offline(
        &self,
        scope_key: &ScopeKey,
        server_record_id: Option<&str>,
        cause: &Error,
    ) -> Result<Outcome<Hydration>> {
        let definition = self
            .store
            .cached_scope(scope_key)
            .await?
            .ok_or_else(|| Error::Offline(format!("no cached definition for {scope_key}: {cause}")))?;

        let local = match server_record_id {
            Some(id) => self.store.get(&CompositeKey::new(scope_key, Some(id))).await?,
            None => None,
        };
        let local = match local {
            Some(record) => Some(record),
            None => match self.store.get(&CompositeKey::unsynced(scope_key)).await? {
                Some(record) => Some(record),
                None => self.store.latest_for_scope(scope_key).await?,
            },
        };

        let offline_reason = format!("offline, using cached definition: {cause}");
        let outcome = match local {
            Some(record) => self.hydrate_local(definition, record).await,
            None => Outcome::Ok(Hydration {
                source: HydrationSource::Fresh,
                definition,
                session: DraftSession::new(scope_key.clone(), None),
                form: FormState::default(),
            }),
        };
        Ok(outcome.with_reasons(vec![offline_reason]))
    }

    async fn hydrate_local(&self, definition: ScopeDefinition, record: DraftRecord) -> Outcome<Hydration> {
        let mut form = FormState::from_payload(&record.payload);
        let (photos, dropped) = self.promoter.prune_missing(form.photos).await;
        form.photos = photos;

        let hydration = Hydration {
            source: HydrationSource::Local,
            definition,
            session: DraftSession::new(record.scope_key, record.server_record_id),
            form,
        };
        Outcome::from_reasons(hydration, missing_photo_reasons(dropped))
    }

    /// Create an empty server draft so later uploads update it in place.
    async fn start_fresh(&self, scope_key: &ScopeKey, definition: ScopeDefinition, token: &str) -> Outcome<Hydration> {
        let placeholder = DraftRecord::new(scope_key.clone(), None, DraftPayload::default());
        let created = match build_upload_fields(&placeholder, true) {
            Ok(fields) => {
                self.api
                    .upsert_draft(
                        token,
                        DraftUpload {
                            fields,
                            files: Vec::new(),
                        },
                    )
                    .await
            }
            Err(error) => Err(error),
        };

        let (server_record_id, reasons) = match created {
            Ok(id) => {
                tracing::info!(scope_key = %scope_key, server_record_id = %id, "Created placeholder draft");
                (Some(id), Vec::new())
            }
            Err(error) => {
                tracing::warn!("Placeholder draft for {} not created: {}", scope_key, error);
                (None, vec![format!("placeholder draft not created: {error}")])
            }
        };

        let hydration = Hydration {
            source: HydrationSource::Fresh,
            definition,
            session: DraftSession::new(scope_key.clone(), server_record_id),
            form: FormState::default(),
        };
        Outcome::from_reasons(hydration, reasons)
    }
}

fn missing_photo_reasons(dropped: Vec<String>) -> Vec<String> {
    dropped
        .into_iter()
        .map(|uri| format!("photo no longer exists: {uri}"))
        .collect()
}
