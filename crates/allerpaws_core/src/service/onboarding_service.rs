//! Pet onboarding across the authentication boundary.
//!
//! # Responsibility
//! - Accept a pet profile before or after the user has an account.
//! - Stash anonymous submissions as the pending draft.
//! - Register the user and hand the draft to the session gate.
//!
//! # Invariants
//! - Drafts are validated before they are stored.
//! - Signed-in submissions bypass the draft store and are quota-gated.

use crate::model::draft::{DraftId, PendingDraft};
use crate::model::pet::PetDraft;
use crate::model::session::Credentials;
use crate::model::validation::ValidationError;
use crate::repo::draft_store::{DraftStoreError, PendingDraftStore};
use crate::service::pet_service::{PetProfile, PetService, PetServiceError};
use crate::service::reconciler::ReconcileResult;
use crate::service::session_gate::{GateError, SessionGate};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum OnboardingError {
    Validation(ValidationError),
    Gate(GateError),
    Pet(PetServiceError),
    DraftStore(DraftStoreError),
}

impl Display for OnboardingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Gate(err) => write!(f, "{err}"),
            Self::Pet(err) => write!(f, "{err}"),
            Self::DraftStore(err) => write!(f, "{err}"),
        }
    }
}

impl Error for OnboardingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Gate(err) => Some(err),
            Self::Pet(err) => Some(err),
            Self::DraftStore(err) => Some(err),
        }
    }
}

impl From<ValidationError> for OnboardingError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GateError> for OnboardingError {
    fn from(value: GateError) -> Self {
        Self::Gate(value)
    }
}

impl From<PetServiceError> for OnboardingError {
    fn from(value: PetServiceError) -> Self {
        Self::Pet(value)
    }
}

impl From<DraftStoreError> for OnboardingError {
    fn from(value: DraftStoreError) -> Self {
        Self::DraftStore(value)
    }
}

/// Result of submitting the pet step.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Signed-in user; the profile was created directly.
    Created(PetProfile),
    /// Anonymous user; the draft is stored and registration comes next.
    RegistrationRequired(DraftId),
}

/// Result of the registration step.
#[derive(Debug)]
pub enum RegisterOutcome {
    /// Confirmation email sent; the draft waits for the returning session.
    VerificationPending,
    /// Session granted immediately; carries the reconciliation result.
    Authenticated(ReconcileResult),
}

pub struct OnboardingService {
    drafts: Arc<PendingDraftStore>,
    gate: Arc<SessionGate>,
    pets: Arc<PetService>,
}

impl OnboardingService {
    pub fn new(
        drafts: Arc<PendingDraftStore>,
        gate: Arc<SessionGate>,
        pets: Arc<PetService>,
    ) -> Self {
        Self { drafts, gate, pets }
    }

    /// Submits the pet profile step.
    pub async fn submit_pet(&self, pet: &PetDraft) -> Result<SubmitOutcome, OnboardingError> {
        pet.validate()?;
        let session = self.gate.session();

        if session.is_authenticated() {
            let profile = self.pets.create_pet(&session, pet).await?;
            return Ok(SubmitOutcome::Created(profile));
        }

        let draft = PendingDraft::new(pet.normalized().to_payload());
        self.drafts.save(&draft)?;
        info!(
            "event=onboarding_submit module=onboarding status=deferred draft_id={}",
            draft.id
        );
        Ok(SubmitOutcome::RegistrationRequired(draft.id))
    }

    /// Registers the user; the stored draft is preserved on any failure.
    pub async fn register(
        &self,
        credentials: &Credentials,
    ) -> Result<RegisterOutcome, OnboardingError> {
        let transition = self.gate.sign_up(credentials).await?;
        Ok(match transition.reconcile {
            Some(result) => RegisterOutcome::Authenticated(result),
            None => RegisterOutcome::VerificationPending,
        })
    }

    /// Pet profile currently waiting for an account, if any.
    pub fn pending_pet(&self) -> Result<Option<PetDraft>, OnboardingError> {
        Ok(self
            .drafts
            .load()?
            .and_then(|draft| PetDraft::from_payload(&draft.payload).ok()))
    }

    /// Discards the pending pet profile.
    pub fn abandon(&self) -> Result<(), OnboardingError> {
        self.drafts.clear()?;
        Ok(())
    }
}
