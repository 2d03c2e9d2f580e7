//! Subscription row model and boundary parsing.
//!
//! # Responsibility
//! - Define the typed `SubscriptionRecord` consumed by entitlement rules.
//! - Ingest loosely-typed backend rows into closed plan/status enumerations.
//! - Select the authoritative row among a user's historical rows.
//!
//! # Invariants
//! - Unrecognized plan or status strings are rejected, never defaulted.
//! - Only the row with the greatest `created_at` is authoritative.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

use super::session::UserId;

/// Subscription plan identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    Free,
    Monthly,
    Annual,
}

impl PlanId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Monthly => "monthly",
            Self::Annual => "annual",
        }
    }

    /// User-facing plan label.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Free => "Free Plan",
            Self::Monthly => "Premium Monthly",
            Self::Annual => "Premium Annual",
        }
    }

    pub fn parse(value: &str) -> Result<Self, SubscriptionParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "monthly" => Ok(Self::Monthly),
            "annual" => Ok(Self::Annual),
            other => Err(SubscriptionParseError::UnknownPlan(other.to_string())),
        }
    }
}

/// Billing status of one subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    None,
}

impl SubscriptionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::None => "none",
        }
    }

    /// Accepts the spellings emitted by the billing backend.
    pub fn parse(value: &str) -> Result<Self, SubscriptionParseError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "past_due" | "pastdue" | "past-due" => Ok(Self::PastDue),
            "none" | "" => Ok(Self::None),
            other => Err(SubscriptionParseError::UnknownStatus(other.to_string())),
        }
    }
}

/// Typed subscription row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Row as delivered by the backend, before ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSubscriptionRow {
    pub user_id: String,
    pub plan_id: String,
    pub status: String,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub created_at: i64,
}

impl TryFrom<RawSubscriptionRow> for SubscriptionRecord {
    type Error = SubscriptionParseError;

    fn try_from(row: RawSubscriptionRow) -> Result<Self, Self::Error> {
        let user_id = row.user_id.trim();
        if user_id.is_empty() {
            return Err(SubscriptionParseError::MissingUserId);
        }
        Ok(Self {
            user_id: UserId::new(user_id),
            plan_id: PlanId::parse(&row.plan_id)?,
            status: SubscriptionStatus::parse(&row.status)?,
            cancel_at_period_end: row.cancel_at_period_end,
            created_at: row.created_at,
        })
    }
}

/// Returns the authoritative row (greatest `created_at`).
///
/// Ties keep the row that appears last in `rows`.
pub fn select_latest<I>(rows: I) -> Option<SubscriptionRecord>
where
    I: IntoIterator<Item = SubscriptionRecord>,
{
    rows.into_iter().fold(None, |best, row| match best {
        Some(current) if current.created_at > row.created_at => Some(current),
        _ => Some(row),
    })
}

/// Ingestion failure for loosely-typed subscription rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionParseError {
    UnknownPlan(String),
    UnknownStatus(String),
    MissingUserId,
}

impl Display for SubscriptionParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPlan(value) => write!(f, "unknown subscription plan `{value}`"),
            Self::UnknownStatus(value) => write!(f, "unknown subscription status `{value}`"),
            Self::MissingUserId => write!(f, "subscription row has no user id"),
        }
    }
}

impl Error for SubscriptionParseError {}

#[cfg(test)]
mod tests {
    use super::{
        select_latest, PlanId, RawSubscriptionRow, SubscriptionParseError, SubscriptionRecord,
        SubscriptionStatus,
    };
    use crate::model::session::UserId;

    fn record(created_at: i64, plan_id: PlanId) -> SubscriptionRecord {
        SubscriptionRecord {
            user_id: UserId::new("u-1"),
            plan_id,
            status: SubscriptionStatus::Active,
            cancel_at_period_end: false,
            created_at,
        }
    }

    #[test]
    fn latest_row_wins_regardless_of_order() {
        let rows = vec![
            record(200, PlanId::Monthly),
            record(300, PlanId::Annual),
            record(100, PlanId::Free),
        ];
        let latest = select_latest(rows).expect("one row should be selected");
        assert_eq!(latest.plan_id, PlanId::Annual);
        assert!(select_latest(Vec::new()).is_none());
    }

    #[test]
    fn raw_rows_parse_into_closed_enums() {
        let row = RawSubscriptionRow {
            user_id: "u-1".to_string(),
            plan_id: "Monthly".to_string(),
            status: "past_due".to_string(),
            cancel_at_period_end: true,
            created_at: 10,
        };
        let parsed = SubscriptionRecord::try_from(row).expect("row should parse");
        assert_eq!(parsed.plan_id, PlanId::Monthly);
        assert_eq!(parsed.status, SubscriptionStatus::PastDue);
        assert!(parsed.cancel_at_period_end);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let row = RawSubscriptionRow {
            user_id: "u-1".to_string(),
            plan_id: "annual".to_string(),
            status: "trialing".to_string(),
            cancel_at_period_end: false,
            created_at: 10,
        };
        assert_eq!(
            SubscriptionRecord::try_from(row),
            Err(SubscriptionParseError::UnknownStatus("trialing".to_string()))
        );
    }
}
