//! Entitlement snapshot model and tier derivation rules.
//!
//! # Responsibility
//! - Derive the quota/feature snapshot granted by a subscription row.
//! - Check creation attempts against snapshot ceilings.
//!
//! # Invariants
//! - Derivation is total: every input, including "no row", yields a snapshot.
//! - A row whose status is not `active` always derives the free tier.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

use super::subscription::{PlanId, SubscriptionRecord, SubscriptionStatus};

/// Pet profiles allowed on the free tier.
pub const FREE_MAX_RESOURCES: u32 = 2;
/// Diary entries per calendar month allowed on the free tier.
pub const FREE_MAX_MONTHLY_ENTRIES: u32 = 30;

/// Entitlement tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

/// Numeric ceiling for a gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quota {
    Limited(u32),
    Unbounded,
}

impl Quota {
    /// Whether one more item fits when `used` items already exist.
    pub fn allows_another(self, used: usize) -> bool {
        match self {
            Self::Limited(max) => used < max as usize,
            Self::Unbounded => true,
        }
    }
}

impl Display for Quota {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(max) => write!(f, "{max}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Quotas and features granted to the current identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementSnapshot {
    pub tier: Tier,
    pub max_resources: Quota,
    pub max_monthly_entries: Quota,
    pub advanced_analysis: bool,
    /// Plan of the authoritative row, `None` when no row exists.
    pub plan: Option<PlanId>,
    /// Subscription ends at the current billing period.
    pub cancel_at_period_end: bool,
}

impl EntitlementSnapshot {
    /// The most restrictive snapshot; used whenever entitlement is unknown.
    pub fn free() -> Self {
        Self {
            tier: Tier::Free,
            max_resources: Quota::Limited(FREE_MAX_RESOURCES),
            max_monthly_entries: Quota::Limited(FREE_MAX_MONTHLY_ENTRIES),
            advanced_analysis: false,
            plan: None,
            cancel_at_period_end: false,
        }
    }

    fn premium(plan: PlanId) -> Self {
        Self {
            tier: Tier::Premium,
            max_resources: Quota::Unbounded,
            max_monthly_entries: Quota::Unbounded,
            advanced_analysis: true,
            plan: Some(plan),
            cancel_at_period_end: false,
        }
    }

    pub fn is_premium(&self) -> bool {
        self.tier == Tier::Premium
    }

    /// User-facing plan label; premium labels only apply to premium tiers.
    pub fn plan_name(&self) -> &'static str {
        match (self.tier, self.plan) {
            (Tier::Premium, Some(plan)) => plan.display_name(),
            _ => PlanId::Free.display_name(),
        }
    }

    /// Rejects creating one more resource when `existing` already meet the ceiling.
    pub fn check_resource_quota(&self, existing: usize) -> Result<(), QuotaExceededError> {
        check(QuotaKind::Resources, self.max_resources, existing)
    }

    /// Rejects one more diary entry when `entries_this_month` meet the ceiling.
    pub fn check_monthly_entry_quota(
        &self,
        entries_this_month: usize,
    ) -> Result<(), QuotaExceededError> {
        check(
            QuotaKind::MonthlyEntries,
            self.max_monthly_entries,
            entries_this_month,
        )
    }

    /// Rejects access to advanced analysis on tiers that do not grant it.
    pub fn require_advanced_analysis(&self) -> Result<(), QuotaExceededError> {
        if self.advanced_analysis {
            return Ok(());
        }
        Err(QuotaExceededError {
            kind: QuotaKind::AdvancedAnalysis,
            limit: 0,
            used: 0,
        })
    }
}

/// Derives the snapshot granted by the authoritative subscription row.
///
/// Rules:
/// - absent row, non-active status, or free plan => free tier.
/// - active monthly/annual plan => premium tier, unbounded ceilings.
pub fn derive(record: Option<&SubscriptionRecord>) -> EntitlementSnapshot {
    let Some(record) = record else {
        return EntitlementSnapshot::free();
    };

    let mut snapshot = match (record.status, record.plan_id) {
        (SubscriptionStatus::Active, PlanId::Monthly | PlanId::Annual) => {
            EntitlementSnapshot::premium(record.plan_id)
        }
        (SubscriptionStatus::Active, PlanId::Free)
        | (
            SubscriptionStatus::Canceled | SubscriptionStatus::PastDue | SubscriptionStatus::None,
            _,
        ) => {
            let mut free = EntitlementSnapshot::free();
            free.plan = Some(record.plan_id);
            free
        }
    };
    snapshot.cancel_at_period_end = record.cancel_at_period_end;
    snapshot
}

fn check(kind: QuotaKind, quota: Quota, used: usize) -> Result<(), QuotaExceededError> {
    match quota {
        Quota::Limited(limit) if !quota.allows_another(used) => {
            Err(QuotaExceededError { kind, limit, used })
        }
        _ => Ok(()),
    }
}

/// Gated operation that hit its ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Resources,
    MonthlyEntries,
    AdvancedAnalysis,
}

/// Creation attempt exceeds the current entitlement; resolved by upgrading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceededError {
    pub kind: QuotaKind,
    pub limit: u32,
    pub used: usize,
}

impl Display for QuotaExceededError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            QuotaKind::Resources => write!(
                f,
                "pet limit reached ({}/{}); upgrade to premium to add more",
                self.used, self.limit
            ),
            QuotaKind::MonthlyEntries => write!(
                f,
                "monthly entry limit reached ({}/{}); upgrade to premium for unlimited entries",
                self.used, self.limit
            ),
            QuotaKind::AdvancedAnalysis => {
                write!(f, "advanced analysis requires a premium plan")
            }
        }
    }
}

impl Error for QuotaExceededError {}
