//! Pending draft model.
//!
//! # Responsibility
//! - Define the single unconfirmed resource captured before authentication.
//! - Carry a stable id that doubles as the backend idempotency key.
//!
//! # Invariants
//! - `id` is generated once per draft and never reused.
//! - `payload` is opaque; storage and reconciliation never inspect it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use super::now_epoch_ms;

/// Stable identifier of one pending draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(Uuid);

impl DraftId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Idempotency key sent with the backend create call for this draft.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey(format!("draft:{}", self.0))
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DraftId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-supplied key that makes a backend create call safe to replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Fresh key for a one-off create outside the draft flow.
    pub fn random() -> Self {
        Self(format!("adhoc:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for IdempotencyKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Opaque resource fields carried by a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftPayload(serde_json::Value);

impl DraftPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// One unconfirmed resource awaiting an owning identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDraft {
    pub id: DraftId,
    pub payload: DraftPayload,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl PendingDraft {
    /// Creates a draft with a generated id stamped at the current time.
    pub fn new(payload: DraftPayload) -> Self {
        Self {
            id: DraftId::new(),
            payload,
            created_at: now_epoch_ms(),
        }
    }
}
