//! Single-slot durable store for the pending draft.
//!
//! # Responsibility
//! - Save, load and clear the one draft captured before authentication.
//! - Serialize writers so save/clear never interleave.
//!
//! # Invariants
//! - At most one draft exists per slot key; `save` is last-write-wins.
//! - The payload is never inspected or validated here.
//! - A slot value that cannot be decoded is dropped, not surfaced.

use crate::model::draft::{DraftId, PendingDraft};
use crate::repo::slot_store::{PersistedSlot, SlotError};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// Slot key used by the pet onboarding flow.
pub const DEFAULT_DRAFT_SLOT_KEY: &str = "allerpaws.pending_pet";

pub type DraftStoreResult<T> = Result<T, DraftStoreError>;

#[derive(Debug)]
pub enum DraftStoreError {
    Slot(SlotError),
    Encode(serde_json::Error),
}

impl Display for DraftStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slot(err) => write!(f, "draft slot unavailable: {err}"),
            Self::Encode(err) => write!(f, "draft could not be encoded: {err}"),
        }
    }
}

impl Error for DraftStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Slot(err) => Some(err),
            Self::Encode(err) => Some(err),
        }
    }
}

impl From<SlotError> for DraftStoreError {
    fn from(value: SlotError) -> Self {
        Self::Slot(value)
    }
}

/// Durable single-slot storage for one unconfirmed draft.
pub struct PendingDraftStore {
    slot: Arc<dyn PersistedSlot>,
    key: String,
    write_lock: Mutex<()>,
}

impl PendingDraftStore {
    /// Creates a store over the default onboarding slot key.
    pub fn new(slot: Arc<dyn PersistedSlot>) -> Self {
        Self::with_key(slot, DEFAULT_DRAFT_SLOT_KEY)
    }

    pub fn with_key(slot: Arc<dyn PersistedSlot>, key: impl Into<String>) -> Self {
        Self {
            slot,
            key: key.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    /// Replaces whatever draft the slot held.
    pub fn save(&self, draft: &PendingDraft) -> DraftStoreResult<()> {
        let encoded = serde_json::to_string(draft).map_err(DraftStoreError::Encode)?;
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.slot.set(&self.key, &encoded)?;
        debug!(
            "event=draft_save module=draft_store status=ok draft_id={}",
            draft.id
        );
        Ok(())
    }

    /// Returns the stored draft, or `None` when the slot is empty.
    ///
    /// An undecodable value is removed and reported as `None`.
    pub fn load(&self) -> DraftStoreResult<Option<PendingDraft>> {
        let Some(raw) = self.slot.get(&self.key)? else {
            return Ok(None);
        };

        match serde_json::from_str::<PendingDraft>(&raw) {
            Ok(draft) => Ok(Some(draft)),
            Err(err) => {
                warn!(
                    "event=draft_load module=draft_store status=discarded error_code=draft_corrupt error={err}"
                );
                let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
                // Only drop the value we failed to decode; a concurrent save wins.
                if self.slot.get(&self.key)?.as_deref() == Some(raw.as_str()) {
                    self.slot.remove(&self.key)?;
                }
                Ok(None)
            }
        }
    }

    /// Abandons the stored draft, if any.
    pub fn clear(&self) -> DraftStoreResult<()> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.slot.remove(&self.key)?;
        debug!("event=draft_clear module=draft_store status=ok");
        Ok(())
    }

    /// Clears the slot only when it still holds draft `id`.
    ///
    /// Returns `true` when the draft was removed. A draft saved after `id`
    /// was read stays in place.
    pub fn clear_if(&self, id: DraftId) -> DraftStoreResult<bool> {
        let _writer = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = match self.slot.get(&self.key)? {
            Some(raw) => serde_json::from_str::<PendingDraft>(&raw).ok(),
            None => None,
        };
        match current {
            Some(draft) if draft.id == id => {
                self.slot.remove(&self.key)?;
                debug!("event=draft_clear module=draft_store status=ok draft_id={id}");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
