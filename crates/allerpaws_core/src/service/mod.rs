//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate draft storage, identity and remote collaborators into
//!   use-case level APIs.
//! - Keep UI/FFI layers decoupled from storage and transport details.
//!
//! # Invariants
//! - One shared `Reconciler` per process; every reconciliation trigger goes
//!   through it.

pub mod entitlement_engine;
pub mod onboarding_service;
pub mod pet_service;
pub mod reconciler;
pub mod session_gate;
