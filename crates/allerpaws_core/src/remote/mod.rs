//! Contracts for remote collaborators and in-process implementations.
//!
//! # Responsibility
//! - Define the async boundaries to the record backend, billing service and
//!   identity provider.
//! - Provide in-memory implementations for offline use and tests.
//!
//! # Invariants
//! - Remote failures are returned as values, never panics.
//! - Loosely-typed backend values are ingested into closed enums here.

pub mod identity;
pub mod record_store;
pub mod subscription_service;
