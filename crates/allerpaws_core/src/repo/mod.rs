//! Client-local persistence: key-value slots and the pending draft store.
//!
//! # Responsibility
//! - Define the `PersistedSlot` contract for durable client-local storage.
//! - Layer the single-slot `PendingDraftStore` over any slot implementation.
//!
//! # Invariants
//! - Slot values are opaque strings; only the draft store interprets them.
//! - Local presence of a draft is never proof that it was reconciled.

pub mod draft_store;
pub mod slot_store;
