//! Confirmed-resource backend contract.
//!
//! # Invariants
//! - `create` with an idempotency key already seen for the same owner returns
//!   the original record instead of inserting a duplicate.
//! - `list` returns newest records first.

use crate::model::draft::{DraftPayload, IdempotencyKey};
use crate::model::now_epoch_ms;
use crate::model::session::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

pub type RecordId = Uuid;

pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

/// Confirmed resource owned by an authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub owner: UserId,
    pub payload: DraftPayload,
    pub idempotency_key: Option<IdempotencyKey>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// List options for one owner's records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFilter {
    pub owner: UserId,
    pub limit: Option<u32>,
}

impl RecordFilter {
    pub fn owned_by(owner: UserId) -> Self {
        Self { owner, limit: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStoreError {
    /// Network or backend outage; safe to retry.
    Unavailable(String),
    /// Backend refused the write (policy, schema).
    Rejected(String),
    NotFound(RecordId),
}

impl Display for RecordStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "record backend unavailable: {message}"),
            Self::Rejected(message) => write!(f, "record backend rejected write: {message}"),
            Self::NotFound(id) => write!(f, "record not found: {id}"),
        }
    }
}

impl Error for RecordStoreError {}

/// Backend persistence for confirmed resources.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(
        &self,
        owner: &UserId,
        payload: &DraftPayload,
        idempotency_key: &IdempotencyKey,
    ) -> RecordStoreResult<Record>;

    async fn list(&self, filter: &RecordFilter) -> RecordStoreResult<Vec<Record>>;

    async fn delete(&self, owner: &UserId, id: RecordId) -> RecordStoreResult<()>;
}

#[derive(Default)]
struct MemoryRecords {
    records: Vec<Record>,
    by_key: HashMap<(UserId, IdempotencyKey), RecordId>,
}

/// In-process record backend honoring idempotency keys.
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<MemoryRecords>,
    create_calls: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create` calls received, including idempotent replays.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of distinct stored records across all owners.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(
        &self,
        owner: &UserId,
        payload: &DraftPayload,
        idempotency_key: &IdempotencyKey,
    ) -> RecordStoreResult<Record> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let replay_key = (owner.clone(), idempotency_key.clone());
        if let Some(existing_id) = state.by_key.get(&replay_key).copied() {
            if let Some(existing) = state.records.iter().find(|record| record.id == existing_id) {
                return Ok(existing.clone());
            }
        }

        let record = Record {
            id: Uuid::new_v4(),
            owner: owner.clone(),
            payload: payload.clone(),
            idempotency_key: Some(idempotency_key.clone()),
            created_at: now_epoch_ms(),
        };
        state.by_key.insert(replay_key, record.id);
        state.records.push(record.clone());
        Ok(record)
    }

    async fn list(&self, filter: &RecordFilter) -> RecordStoreResult<Vec<Record>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let limit = filter.limit.map_or(usize::MAX, |limit| limit as usize);
        // Insertion order doubles as creation order.
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|record| record.owner == filter.owner)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, owner: &UserId, id: RecordId) -> RecordStoreResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let position = state
            .records
            .iter()
            .position(|record| record.id == id && &record.owner == owner)
            .ok_or(RecordStoreError::NotFound(id))?;
        state.records.remove(position);
        state.by_key.retain(|_, record_id| *record_id != id);
        Ok(())
    }
}
