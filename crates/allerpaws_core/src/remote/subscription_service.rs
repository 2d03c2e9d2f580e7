//! Billing backend contract for subscription rows and plan changes.
//!
//! # Invariants
//! - Rows leave this boundary as typed `SubscriptionRecord`s.
//! - `fetch_latest` returns the row with the greatest `created_at`.
//! - Only the latest row decides; an unreadable older row never masks it.

use crate::model::session::UserId;
use crate::model::subscription::{
    select_latest, RawSubscriptionRow, SubscriptionParseError, SubscriptionRecord,
};
use async_trait::async_trait;
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Network or backend outage.
    Unavailable(String),
    /// Backend returned a row outside the known plan/status vocabulary.
    Malformed(SubscriptionParseError),
    /// Plan change requested for a user without any subscription row.
    NotSubscribed(UserId),
}

impl Display for SubscriptionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "subscription service unavailable: {message}"),
            Self::Malformed(err) => write!(f, "malformed subscription row: {err}"),
            Self::NotSubscribed(user_id) => write!(f, "no subscription for user {user_id}"),
        }
    }
}

impl Error for SubscriptionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Malformed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SubscriptionParseError> for SubscriptionError {
    fn from(value: SubscriptionParseError) -> Self {
        Self::Malformed(value)
    }
}

/// Authoritative source of subscription rows and plan-change actions.
#[async_trait]
pub trait SubscriptionService: Send + Sync {
    /// Returns every row recorded for `user_id`, in any order.
    async fn fetch_history(&self, user_id: &UserId) -> SubscriptionResult<Vec<SubscriptionRecord>>;

    /// Returns the authoritative row, or `None` when the user never subscribed.
    ///
    /// Backends that see raw rows should override this to parse only the
    /// newest one, so an unreadable newest row fails instead of falling back
    /// to an older readable row.
    async fn fetch_latest(
        &self,
        user_id: &UserId,
    ) -> SubscriptionResult<Option<SubscriptionRecord>> {
        Ok(select_latest(self.fetch_history(user_id).await?))
    }

    /// Requests cancellation at the end of the current billing period.
    async fn cancel(&self, user_id: &UserId) -> SubscriptionResult<()>;

    /// Withdraws a pending cancellation.
    async fn resume(&self, user_id: &UserId) -> SubscriptionResult<()>;
}

/// In-process billing backend storing raw rows as the backend would send them.
#[derive(Default)]
pub struct InMemorySubscriptionService {
    rows: Mutex<Vec<RawSubscriptionRow>>,
    offline: AtomicBool,
    fetch_calls: AtomicUsize,
}

impl InMemorySubscriptionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a raw backend row.
    pub fn insert_raw(&self, row: RawSubscriptionRow) {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row);
    }

    /// Appends a typed row.
    pub fn insert(&self, record: &SubscriptionRecord) {
        self.insert_raw(RawSubscriptionRow {
            user_id: record.user_id.as_str().to_string(),
            plan_id: record.plan_id.as_str().to_string(),
            status: record.status.as_str().to_string(),
            cancel_at_period_end: record.cancel_at_period_end,
            created_at: record.created_at,
        });
    }

    /// Simulates a network outage for every subsequent call.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn ensure_online(&self) -> SubscriptionResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Unavailable(
                "billing backend offline".to_string(),
            ));
        }
        Ok(())
    }

    fn set_cancel_flag(&self, user_id: &UserId, cancel: bool) -> SubscriptionResult<()> {
        self.ensure_online()?;
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = rows
            .iter_mut()
            .filter(|row| row.user_id == user_id.as_str())
            .reduce(|best, row| if best.created_at > row.created_at { best } else { row })
            .ok_or_else(|| SubscriptionError::NotSubscribed(user_id.clone()))?;
        latest.cancel_at_period_end = cancel;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionService for InMemorySubscriptionService {
    /// Older unreadable rows are skipped with a warning.
    async fn fetch_history(&self, user_id: &UserId) -> SubscriptionResult<Vec<SubscriptionRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .filter(|row| row.user_id == user_id.as_str())
            .filter_map(|row| match SubscriptionRecord::try_from(row.clone()) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(
                        "event=subscription_ingest module=subscription status=skipped created_at={} error={err}",
                        row.created_at
                    );
                    None
                }
            })
            .collect())
    }

    /// Picks the newest raw row first and parses only that one.
    async fn fetch_latest(
        &self,
        user_id: &UserId,
    ) -> SubscriptionResult<Option<SubscriptionRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        rows.iter()
            .filter(|row| row.user_id == user_id.as_str())
            .reduce(|best, row| if best.created_at > row.created_at { best } else { row })
            .cloned()
            .map(SubscriptionRecord::try_from)
            .transpose()
            .map_err(SubscriptionError::from)
    }

    async fn cancel(&self, user_id: &UserId) -> SubscriptionResult<()> {
        self.set_cancel_flag(user_id, true)
    }

    async fn resume(&self, user_id: &UserId) -> SubscriptionResult<()> {
        self.set_cancel_flag(user_id, false)
    }
}
