//! Local input validation errors.
//!
//! Validation failures block submission at the call site and never reach the
//! network. They are not logged as system failures.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Field-level validation failure for drafts and credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field is empty after trimming.
    MissingField(&'static str),
    /// Field is present but violates a format or range rule.
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "{field} is required"),
            Self::InvalidField { field, reason } => write!(f, "{field} is invalid: {reason}"),
        }
    }
}

impl Error for ValidationError {}
