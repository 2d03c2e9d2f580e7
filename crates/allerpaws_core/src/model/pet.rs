//! Pet profile draft model.
//!
//! # Responsibility
//! - Define the typed fields captured by the pet onboarding flow.
//! - Convert to and from the opaque `DraftPayload` carried by drafts and records.
//!
//! # Invariants
//! - `name` must be non-empty after trimming before any submission.
//! - Allergy names are trimmed, non-empty and deduplicated case-insensitively.

use serde::{Deserialize, Serialize};

use super::draft::DraftPayload;
use super::validation::ValidationError;

const MAX_NAME_CHARS: usize = 80;

/// Pet species accepted by the profile form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
    Other,
}

/// Pet profile fields as captured before and after authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetDraft {
    pub name: String,
    pub species: Species,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    /// Age in whole years.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// Weight in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default)]
    pub known_allergies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl PetDraft {
    /// Creates a draft with only the required fields set.
    pub fn new(name: impl Into<String>, species: Species) -> Self {
        Self {
            name: name.into(),
            species,
            breed: None,
            age: None,
            weight: None,
            known_allergies: Vec::new(),
            image_url: None,
        }
    }

    /// Validates fields required before the draft may leave the form.
    ///
    /// # Errors
    /// - `MissingField("name")` when the name is blank.
    /// - `InvalidField` for over-long names or non-positive weights.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField("name"));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(ValidationError::InvalidField {
                field: "name",
                reason: "must be at most 80 characters",
            });
        }
        if let Some(weight) = self.weight {
            if !weight.is_finite() || weight <= 0.0 {
                return Err(ValidationError::InvalidField {
                    field: "weight",
                    reason: "must be a positive number",
                });
            }
        }
        Ok(())
    }

    /// Returns a copy with trimmed text fields and normalized allergy list.
    pub fn normalized(&self) -> Self {
        let mut seen = Vec::<String>::new();
        let mut allergies = Vec::new();
        for allergy in &self.known_allergies {
            let trimmed = allergy.trim();
            if trimmed.is_empty() {
                continue;
            }
            let folded = trimmed.to_lowercase();
            if seen.contains(&folded) {
                continue;
            }
            seen.push(folded);
            allergies.push(trimmed.to_string());
        }

        Self {
            name: self.name.trim().to_string(),
            species: self.species,
            breed: non_blank(self.breed.as_deref()),
            age: self.age,
            weight: self.weight,
            known_allergies: allergies,
            image_url: non_blank(self.image_url.as_deref()),
        }
    }

    /// Serializes into the opaque payload stored by drafts and records.
    pub fn to_payload(&self) -> DraftPayload {
        // A struct of plain fields cannot fail to serialize.
        DraftPayload::new(serde_json::to_value(self).unwrap_or(serde_json::Value::Null))
    }

    /// Interprets an opaque payload as a pet profile.
    pub fn from_payload(payload: &DraftPayload) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.as_value().clone())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
