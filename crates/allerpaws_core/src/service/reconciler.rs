//! Exactly-once reconciliation of the pending draft.
//!
//! # Responsibility
//! - Drain the pending draft into the record backend once a session exists.
//! - Collapse concurrent flush requests onto one physical create call.
//!
//! # Invariants
//! - The draft is cleared only after the backend confirmed the create.
//! - At most one create call is outstanding per draft id.
//! - Every create carries the draft id as idempotency key, so a replay after
//!   a lost response returns the original record.
//! - A failed create leaves the draft in place for the next trigger.

use crate::model::draft::DraftId;
use crate::model::session::Session;
use crate::remote::record_store::{Record, RecordStore, RecordStoreError};
use crate::repo::draft_store::{DraftStoreError, PendingDraftStore};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;

pub type ReconcileResult = Result<FlushOutcome, ReconcileError>;

/// Successful (possibly no-op) flush result.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// No draft is stored.
    NothingPending,
    /// A draft exists but the session is not authenticated yet.
    Deferred,
    /// Another flush for this draft is in flight; no call was issued.
    AlreadyInProgress(DraftId),
    /// The draft was persisted and removed from the slot.
    Created { draft_id: DraftId, record: Record },
}

impl FlushOutcome {
    pub fn created_record(&self) -> Option<&Record> {
        match self {
            Self::Created { record, .. } => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ReconcileError {
    /// Local slot could not be read or cleared.
    DraftStore(DraftStoreError),
    /// Backend create failed; the draft is retained.
    Persistence {
        draft_id: DraftId,
        source: RecordStoreError,
    },
    /// The detached flush task panicked or was aborted before reporting.
    TaskFailed(String),
}

impl ReconcileError {
    /// Whether a later flush may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence { source, .. } => !matches!(source, RecordStoreError::Rejected(_)),
            Self::DraftStore(_) | Self::TaskFailed(_) => true,
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DraftStore(err) => write!(f, "{err}"),
            Self::Persistence { draft_id, source } => {
                write!(f, "draft {draft_id} could not be saved: {source}")
            }
            Self::TaskFailed(message) => write!(f, "flush task failed: {message}"),
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DraftStore(err) => Some(err),
            Self::Persistence { source, .. } => Some(source),
            Self::TaskFailed(_) => None,
        }
    }
}

impl From<DraftStoreError> for ReconcileError {
    fn from(value: DraftStoreError) -> Self {
        Self::DraftStore(value)
    }
}

/// Shared reconciler; every observer must go through the same instance.
pub struct Reconciler {
    drafts: Arc<PendingDraftStore>,
    records: Arc<dyn RecordStore>,
    in_flight: Mutex<HashSet<DraftId>>,
}

impl Reconciler {
    pub fn new(drafts: Arc<PendingDraftStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            drafts,
            records,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a flush for `draft_id` is currently awaiting the backend.
    pub fn is_in_flight(&self, draft_id: DraftId) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&draft_id)
    }

    /// Persists the pending draft for the session's identity.
    ///
    /// # Contract
    /// - No draft => `NothingPending`; not authenticated => `Deferred`.
    /// - Concurrent call for the same draft => `AlreadyInProgress`.
    /// - Create success => draft cleared, `Created`.
    ///
    /// # Errors
    /// - `Persistence` when the backend call fails; the draft is kept.
    /// - `DraftStore` when the local slot fails.
    pub async fn flush(&self, session: &Session) -> ReconcileResult {
        let Some(draft) = self.drafts.load()? else {
            return Ok(FlushOutcome::NothingPending);
        };

        let owner = match session.user_id() {
            Some(owner) if session.is_authenticated() => owner,
            _ => {
                debug!(
                    "event=reconcile module=reconciler status=deferred draft_id={} session_state={}",
                    draft.id,
                    session.state().as_str()
                );
                return Ok(FlushOutcome::Deferred);
            }
        };

        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, draft.id) else {
            debug!(
                "event=reconcile module=reconciler status=in_progress draft_id={}",
                draft.id
            );
            return Ok(FlushOutcome::AlreadyInProgress(draft.id));
        };

        // A flush that finished between our load and acquire already cleared it.
        let still_pending = self
            .drafts
            .load()?
            .is_some_and(|current| current.id == draft.id);
        if !still_pending {
            return Ok(FlushOutcome::NothingPending);
        }

        let started_at = Instant::now();
        info!(
            "event=reconcile module=reconciler status=start draft_id={}",
            draft.id
        );

        let record = match self
            .records
            .create(owner, &draft.payload, &draft.id.idempotency_key())
            .await
        {
            Ok(record) => record,
            Err(source) => {
                warn!(
                    "event=reconcile module=reconciler status=error draft_id={} duration_ms={} error_code=record_create_failed error={source}",
                    draft.id,
                    started_at.elapsed().as_millis()
                );
                return Err(ReconcileError::Persistence {
                    draft_id: draft.id,
                    source,
                });
            }
        };

        let cleared = self.drafts.clear_if(draft.id)?;
        info!(
            "event=reconcile module=reconciler status=ok draft_id={} record_id={} cleared={} duration_ms={}",
            draft.id,
            record.id,
            cleared,
            started_at.elapsed().as_millis()
        );
        Ok(FlushOutcome::Created {
            draft_id: draft.id,
            record,
        })
    }

    /// Runs `flush` as a detached task.
    ///
    /// Dropping the returned handle does not cancel the flush; its side
    /// effects complete and only the result is discarded.
    pub fn spawn_flush(self: &Arc<Self>, session: Session) -> JoinHandle<ReconcileResult> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move { reconciler.flush(&session).await })
    }
}

/// Marks one draft id as in flight until dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<DraftId>>,
    draft_id: DraftId,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<DraftId>>, draft_id: DraftId) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(draft_id);
        inserted.then_some(Self {
            in_flight,
            draft_id,
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.draft_id);
    }
}

#[cfg(test)]
mod tests {
    use super::InFlightGuard;
    use crate::model::draft::DraftId;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn guard_is_exclusive_per_draft_and_released_on_drop() {
        let in_flight = Mutex::new(HashSet::new());
        let first = DraftId::new();
        let other = DraftId::new();

        let guard = InFlightGuard::acquire(&in_flight, first).expect("first acquire");
        assert!(InFlightGuard::acquire(&in_flight, first).is_none());
        assert!(InFlightGuard::acquire(&in_flight, other).is_some());

        drop(guard);
        assert!(InFlightGuard::acquire(&in_flight, first).is_some());
    }
}
