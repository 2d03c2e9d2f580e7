//! Quota-gated pet profile use-cases for signed-in users.
//!
//! # Responsibility
//! - Create, list and delete pet profiles through the record backend.
//! - Consult the entitlement snapshot before every create.
//!
//! # Invariants
//! - Validation and quota checks run before any backend write.
//! - Records whose payload is not a pet profile are skipped when listing.

use crate::model::draft::IdempotencyKey;
use crate::model::entitlement::QuotaExceededError;
use crate::model::pet::PetDraft;
use crate::model::session::{Session, UserId};
use crate::model::validation::ValidationError;
use crate::remote::record_store::{Record, RecordFilter, RecordId, RecordStore, RecordStoreError};
use crate::service::entitlement_engine::EntitlementEngine;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum PetServiceError {
    Validation(ValidationError),
    NotAuthenticated,
    /// User-actionable: upgrade to create more.
    QuotaExceeded(QuotaExceededError),
    Persistence(RecordStoreError),
    /// Backend returned a record that is not a pet profile.
    InvalidData(String),
}

impl Display for PetServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotAuthenticated => write!(f, "sign in to manage pets"),
            Self::QuotaExceeded(err) => write!(f, "{err}"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid pet record: {message}"),
        }
    }
}

impl Error for PetServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::QuotaExceeded(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::NotAuthenticated | Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for PetServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<QuotaExceededError> for PetServiceError {
    fn from(value: QuotaExceededError) -> Self {
        Self::QuotaExceeded(value)
    }
}

impl From<RecordStoreError> for PetServiceError {
    fn from(value: RecordStoreError) -> Self {
        Self::Persistence(value)
    }
}

/// Confirmed pet profile.
#[derive(Debug, Clone, PartialEq)]
pub struct PetProfile {
    pub id: RecordId,
    pub owner: UserId,
    pub pet: PetDraft,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

impl TryFrom<&Record> for PetProfile {
    type Error = PetServiceError;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        let pet = PetDraft::from_payload(&record.payload)
            .map_err(|err| PetServiceError::InvalidData(format!("record {}: {err}", record.id)))?;
        Ok(Self {
            id: record.id,
            owner: record.owner.clone(),
            pet,
            created_at: record.created_at,
        })
    }
}

pub struct PetService {
    records: Arc<dyn RecordStore>,
    entitlements: Arc<EntitlementEngine>,
}

impl PetService {
    pub fn new(records: Arc<dyn RecordStore>, entitlements: Arc<EntitlementEngine>) -> Self {
        Self {
            records,
            entitlements,
        }
    }

    /// Creates one pet profile for the signed-in user.
    ///
    /// # Errors
    /// - `Validation` / `NotAuthenticated` / `QuotaExceeded` before any write.
    /// - `Persistence` when the backend create fails.
    pub async fn create_pet(
        &self,
        session: &Session,
        draft: &PetDraft,
    ) -> Result<PetProfile, PetServiceError> {
        draft.validate()?;
        let owner = require_user(session)?;

        let snapshot = self.entitlements.snapshot(session).await;
        let existing = self
            .records
            .list(&RecordFilter::owned_by(owner.clone()))
            .await?;
        snapshot.check_resource_quota(existing.len())?;

        let payload = draft.normalized().to_payload();
        let record = match self
            .records
            .create(owner, &payload, &IdempotencyKey::random())
            .await
        {
            Ok(record) => record,
            Err(err) => {
                warn!("event=pet_create module=pet_service status=error error={err}");
                return Err(err.into());
            }
        };
        info!(
            "event=pet_create module=pet_service status=ok record_id={}",
            record.id
        );
        PetProfile::try_from(&record)
    }

    /// Lists the signed-in user's pets, newest first.
    pub async fn list_pets(&self, session: &Session) -> Result<Vec<PetProfile>, PetServiceError> {
        let owner = require_user(session)?;
        let records = self
            .records
            .list(&RecordFilter::owned_by(owner.clone()))
            .await?;

        Ok(records
            .iter()
            .filter_map(|record| match PetProfile::try_from(record) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!("event=pet_list module=pet_service status=skipped error={err}");
                    None
                }
            })
            .collect())
    }

    pub async fn delete_pet(&self, session: &Session, id: RecordId) -> Result<(), PetServiceError> {
        let owner = require_user(session)?;
        self.records.delete(owner, id).await?;
        info!("event=pet_delete module=pet_service status=ok record_id={id}");
        Ok(())
    }
}

fn require_user(session: &Session) -> Result<&UserId, PetServiceError> {
    session
        .user_id()
        .filter(|_| session.is_authenticated())
        .ok_or(PetServiceError::NotAuthenticated)
}
