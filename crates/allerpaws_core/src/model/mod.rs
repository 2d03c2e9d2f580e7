//! Domain model for drafts, sessions, subscriptions and entitlements.
//!
//! # Responsibility
//! - Define canonical data structures used by reconciliation and gating logic.
//! - Ingest loosely-typed backend values into closed enumerations.
//!
//! # Invariants
//! - Draft payloads are opaque to storage; only `PetDraft` interprets them.
//! - `EntitlementSnapshot` is derived, never persisted.

pub mod draft;
pub mod entitlement;
pub mod pet;
pub mod session;
pub mod subscription;
pub mod validation;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Clock skew before the epoch collapses to `0`.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
