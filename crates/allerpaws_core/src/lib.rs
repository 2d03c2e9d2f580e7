//! Core domain logic for AllerPaws.
//!
//! This crate owns deferred pet creation across the sign-up boundary and the
//! subscription gating of every resource-creating path.

pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;

pub use logging::{
    default_log_level, init_logging, logging_status, LogConfig, LogLevel, LoggingError,
};
pub use model::draft::{DraftId, DraftPayload, IdempotencyKey, PendingDraft};
pub use model::entitlement::{
    derive, EntitlementSnapshot, Quota, QuotaExceededError, QuotaKind, Tier,
};
pub use model::pet::{PetDraft, Species};
pub use model::session::{Credentials, Session, SessionState, UserId};
pub use model::subscription::{
    PlanId, RawSubscriptionRow, SubscriptionParseError, SubscriptionRecord, SubscriptionStatus,
};
pub use model::validation::ValidationError;
pub use remote::identity::{
    AuthError, AuthResult, IdentityProvider, InMemoryIdentityProvider, SignUpOutcome,
};
pub use remote::record_store::{
    InMemoryRecordStore, Record, RecordFilter, RecordId, RecordStore, RecordStoreError,
    RecordStoreResult,
};
pub use remote::subscription_service::{
    InMemorySubscriptionService, SubscriptionError, SubscriptionResult, SubscriptionService,
};
pub use repo::draft_store::{
    DraftStoreError, DraftStoreResult, PendingDraftStore, DEFAULT_DRAFT_SLOT_KEY,
};
pub use repo::slot_store::{MemorySlotStore, PersistedSlot, SlotError, SlotResult, SqliteSlotStore};
pub use service::entitlement_engine::{EntitlementEngine, PlanChangeError};
pub use service::onboarding_service::{
    OnboardingError, OnboardingService, RegisterOutcome, SubmitOutcome,
};
pub use service::pet_service::{PetProfile, PetService, PetServiceError};
pub use service::reconciler::{FlushOutcome, ReconcileError, ReconcileResult, Reconciler};
pub use service::session_gate::{GateError, GateResult, SessionGate, Transition};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
