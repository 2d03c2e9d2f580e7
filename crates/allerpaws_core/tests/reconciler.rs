use allerpaws_core::{
    DraftPayload, FlushOutcome, IdempotencyKey, InMemoryRecordStore, MemorySlotStore,
    PendingDraft, PendingDraftStore, PetDraft, ReconcileError, Reconciler, Record, RecordFilter,
    RecordId, RecordStore, RecordStoreError, RecordStoreResult, Session, Species, UserId,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Holds every create until `release` is notified.
#[derive(Default)]
struct GatedRecordStore {
    inner: InMemoryRecordStore,
    release: Notify,
}

#[async_trait]
impl RecordStore for GatedRecordStore {
    async fn create(
        &self,
        owner: &UserId,
        payload: &DraftPayload,
        idempotency_key: &IdempotencyKey,
    ) -> RecordStoreResult<Record> {
        self.release.notified().await;
        self.inner.create(owner, payload, idempotency_key).await
    }

    async fn list(&self, filter: &RecordFilter) -> RecordStoreResult<Vec<Record>> {
        self.inner.list(filter).await
    }

    async fn delete(&self, owner: &UserId, id: RecordId) -> RecordStoreResult<()> {
        self.inner.delete(owner, id).await
    }
}

/// Fails the first `failures` creates. With `commit_before_failing` the row
/// is written first, modelling a response lost after the backend committed.
struct FlakyRecordStore {
    inner: InMemoryRecordStore,
    failures: AtomicUsize,
    commit_before_failing: bool,
}

impl FlakyRecordStore {
    fn new(failures: usize, commit_before_failing: bool) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            failures: AtomicUsize::new(failures),
            commit_before_failing,
        }
    }
}

#[async_trait]
impl RecordStore for FlakyRecordStore {
    async fn create(
        &self,
        owner: &UserId,
        payload: &DraftPayload,
        idempotency_key: &IdempotencyKey,
    ) -> RecordStoreResult<Record> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return self.inner.create(owner, payload, idempotency_key).await;
        }
        self.failures.store(remaining - 1, Ordering::SeqCst);
        if self.commit_before_failing {
            self.inner.create(owner, payload, idempotency_key).await?;
        }
        Err(RecordStoreError::Unavailable("connection reset".to_string()))
    }

    async fn list(&self, filter: &RecordFilter) -> RecordStoreResult<Vec<Record>> {
        self.inner.list(filter).await
    }

    async fn delete(&self, owner: &UserId, id: RecordId) -> RecordStoreResult<()> {
        self.inner.delete(owner, id).await
    }
}

fn draft_store() -> Arc<PendingDraftStore> {
    Arc::new(PendingDraftStore::new(Arc::new(MemorySlotStore::new())))
}

fn pet_draft(name: &str) -> PendingDraft {
    PendingDraft::new(PetDraft::new(name, Species::Dog).to_payload())
}

fn signed_in() -> Session {
    Session::authenticated(UserId::new("user-1"))
}

#[tokio::test]
async fn flush_without_draft_is_a_noop() {
    let records = Arc::new(InMemoryRecordStore::new());
    let reconciler = Reconciler::new(draft_store(), records.clone());

    let outcome = reconciler.flush(&signed_in()).await.unwrap();
    assert_eq!(outcome, FlushOutcome::NothingPending);
    assert_eq!(records.create_calls(), 0);
}

#[tokio::test]
async fn flush_defers_until_authenticated() {
    let drafts = draft_store();
    let records = Arc::new(InMemoryRecordStore::new());
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    drafts.save(&pet_draft("Rex")).unwrap();

    for session in [
        Session::anonymous(),
        Session::pending_verification("owner@example.com"),
        Session::error("invalid email or password"),
    ] {
        assert_eq!(
            reconciler.flush(&session).await.unwrap(),
            FlushOutcome::Deferred
        );
    }
    assert_eq!(records.create_calls(), 0);
    assert!(drafts.load().unwrap().is_some());
}

#[tokio::test]
async fn successful_flush_clears_draft_and_second_flush_is_noop() {
    let drafts = draft_store();
    let records = Arc::new(InMemoryRecordStore::new());
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    let draft = pet_draft("Rex");
    drafts.save(&draft).unwrap();

    let first = reconciler.flush(&signed_in()).await.unwrap();
    let record = first.created_record().expect("first flush creates");
    assert_eq!(record.owner, UserId::new("user-1"));
    assert_eq!(record.payload, draft.payload);
    assert_eq!(record.idempotency_key, Some(draft.id.idempotency_key()));

    let second = reconciler.flush(&signed_in()).await.unwrap();
    assert_eq!(second, FlushOutcome::NothingPending);
    assert_eq!(records.create_calls(), 1);
    assert!(drafts.load().unwrap().is_none());
}

#[tokio::test]
async fn failed_flush_keeps_draft_for_the_next_trigger() {
    let drafts = draft_store();
    let records = Arc::new(FlakyRecordStore::new(1, false));
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    let draft = pet_draft("Rex");
    drafts.save(&draft).unwrap();

    let err = reconciler.flush(&signed_in()).await.unwrap_err();
    match &err {
        ReconcileError::Persistence { draft_id, .. } => assert_eq!(*draft_id, draft.id),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
    assert_eq!(drafts.load().unwrap().map(|d| d.id), Some(draft.id));

    let retried = reconciler.flush(&signed_in()).await.unwrap();
    assert!(retried.created_record().is_some());
    assert!(drafts.load().unwrap().is_none());
}

#[tokio::test]
async fn retry_after_lost_response_does_not_duplicate() {
    let drafts = draft_store();
    let records = Arc::new(FlakyRecordStore::new(1, true));
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    drafts.save(&pet_draft("Rex")).unwrap();

    reconciler.flush(&signed_in()).await.unwrap_err();
    let retried = reconciler.flush(&signed_in()).await.unwrap();

    let record = retried.created_record().expect("retry returns the record");
    let stored = records
        .list(&RecordFilter::owned_by(UserId::new("user-1")))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);
}

#[tokio::test]
async fn concurrent_flushes_issue_one_create() {
    let drafts = draft_store();
    let records = Arc::new(GatedRecordStore::default());
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    let draft = pet_draft("Rex");
    drafts.save(&draft).unwrap();
    let session = signed_in();

    let (first, second, third) = tokio::join!(
        reconciler.flush(&session),
        reconciler.flush(&session),
        async {
            let outcome = reconciler.flush(&session).await;
            assert!(reconciler.is_in_flight(draft.id));
            records.release.notify_one();
            outcome
        }
    );

    assert!(first.unwrap().created_record().is_some());
    assert_eq!(second.unwrap(), FlushOutcome::AlreadyInProgress(draft.id));
    assert_eq!(third.unwrap(), FlushOutcome::AlreadyInProgress(draft.id));
    assert_eq!(records.inner.create_calls(), 1);
    assert!(!reconciler.is_in_flight(draft.id));
    assert!(drafts.load().unwrap().is_none());
}

#[tokio::test]
async fn draft_saved_during_flight_survives_completion() {
    let drafts = draft_store();
    let records = Arc::new(GatedRecordStore::default());
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    let first_draft = pet_draft("A");
    let second_draft = pet_draft("B");
    drafts.save(&first_draft).unwrap();

    let session = signed_in();
    let (outcome, ()) = tokio::join!(reconciler.flush(&session), async {
        drafts.save(&second_draft).unwrap();
        records.release.notify_one();
    });

    assert_eq!(
        outcome.unwrap().created_record().map(|r| r.payload.clone()),
        Some(first_draft.payload)
    );
    assert_eq!(drafts.load().unwrap().map(|d| d.id), Some(second_draft.id));
}

#[tokio::test]
async fn dropped_flush_releases_the_guard() {
    let drafts = draft_store();
    let records = Arc::new(GatedRecordStore::default());
    let reconciler = Reconciler::new(drafts.clone(), records.clone());
    let draft = pet_draft("Rex");
    drafts.save(&draft).unwrap();
    let session = signed_in();

    {
        let pending = reconciler.flush(&session);
        tokio::pin!(pending);
        let polled = futures_poll_once(pending.as_mut()).await;
        assert!(polled.is_none());
        assert!(reconciler.is_in_flight(draft.id));
    }

    assert!(!reconciler.is_in_flight(draft.id));
    assert!(drafts.load().unwrap().is_some());
}

#[tokio::test]
async fn detached_flush_completes_after_handle_is_dropped() {
    let drafts = draft_store();
    let records = Arc::new(InMemoryRecordStore::new());
    let reconciler = Arc::new(Reconciler::new(drafts.clone(), records.clone()));
    drafts.save(&pet_draft("Rex")).unwrap();

    drop(reconciler.spawn_flush(signed_in()));

    for _ in 0..16 {
        if drafts.load().unwrap().is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(drafts.load().unwrap().is_none());
    assert_eq!(records.create_calls(), 1);
}

/// Polls a future exactly once, returning its output if it was ready.
async fn futures_poll_once<F: std::future::Future + Unpin>(mut fut: F) -> Option<F::Output> {
    std::future::poll_fn(|cx| {
        std::task::Poll::Ready(match std::future::Future::poll(std::pin::Pin::new(&mut fut), cx) {
            std::task::Poll::Ready(output) => Some(output),
            std::task::Poll::Pending => None,
        })
    })
    .await
}
