//! Entitlement derivation with fail-safe defaults and per-identity caching.
//!
//! # Responsibility
//! - Fetch the authoritative subscription row and derive a snapshot.
//! - Memoize the snapshot for the current identity.
//! - Forward plan-change actions and reflect acknowledgements optimistically.
//! - Admit or refuse diary entries and advanced analysis for the session.
//!
//! # Invariants
//! - `snapshot` never fails; unknown entitlement resolves to the free tier,
//!   and that fallback is never cached.
//! - A cached snapshot is only served to the identity it was computed for.
//! - A fetch that started before `invalidate` never repopulates the cache.

use crate::model::entitlement::{derive, EntitlementSnapshot, QuotaExceededError};
use crate::model::session::{Session, UserId};
use crate::model::subscription::SubscriptionRecord;
use crate::remote::subscription_service::{
    SubscriptionError, SubscriptionResult, SubscriptionService,
};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Failure of a cancel/resume request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChangeError {
    NotAuthenticated,
    Service(SubscriptionError),
}

impl Display for PlanChangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAuthenticated => write!(f, "plan changes require a signed-in user"),
            Self::Service(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PlanChangeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotAuthenticated => None,
            Self::Service(err) => Some(err),
        }
    }
}

struct CachedSnapshot {
    user_id: UserId,
    snapshot: EntitlementSnapshot,
}

#[derive(Default)]
struct Cache {
    entry: Option<CachedSnapshot>,
    generation: u64,
}

pub struct EntitlementEngine {
    service: Arc<dyn SubscriptionService>,
    cache: Mutex<Cache>,
}

impl EntitlementEngine {
    pub fn new(service: Arc<dyn SubscriptionService>) -> Self {
        Self {
            service,
            cache: Mutex::new(Cache::default()),
        }
    }

    /// Fetches the authoritative subscription row for `user_id`.
    pub async fn fetch(&self, user_id: &UserId) -> SubscriptionResult<Option<SubscriptionRecord>> {
        self.service.fetch_latest(user_id).await
    }

    /// Derives the snapshot granted by `record`; see [`derive`].
    pub fn derive(record: Option<&SubscriptionRecord>) -> EntitlementSnapshot {
        derive(record)
    }

    /// Returns the snapshot for the session's identity.
    ///
    /// Anonymous sessions get the free tier without a network call. A cached
    /// snapshot for another identity is discarded and recomputed.
    pub async fn snapshot(&self, session: &Session) -> EntitlementSnapshot {
        let Some(user_id) = authenticated_user(session) else {
            return EntitlementSnapshot::free();
        };

        let generation = {
            let cache = self.lock();
            if let Some(entry) = cache.entry.as_ref().filter(|entry| &entry.user_id == user_id) {
                return entry.snapshot.clone();
            }
            cache.generation
        };

        self.recompute(user_id, generation).await
    }

    /// Drops the cache and recomputes for the session's identity.
    pub async fn refresh(&self, session: &Session) -> EntitlementSnapshot {
        let generation = self.invalidate();
        match authenticated_user(session) {
            Some(user_id) => self.recompute(user_id, generation).await,
            None => EntitlementSnapshot::free(),
        }
    }

    /// Drops the cached snapshot. Returns the new cache generation.
    pub fn invalidate(&self) -> u64 {
        let mut cache = self.lock();
        cache.entry = None;
        cache.generation += 1;
        cache.generation
    }

    /// Cached snapshot for `user_id`, without fetching.
    pub fn cached(&self, user_id: &UserId) -> Option<EntitlementSnapshot> {
        self.lock()
            .entry
            .as_ref()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| entry.snapshot.clone())
    }

    /// Admits one more diary entry when `entries_this_month` is under the
    /// session's monthly ceiling.
    pub async fn authorize_entry(
        &self,
        session: &Session,
        entries_this_month: usize,
    ) -> Result<(), QuotaExceededError> {
        let snapshot = self.snapshot(session).await;
        snapshot
            .check_monthly_entry_quota(entries_this_month)
            .map_err(|err| {
                info!(
                    "event=entry_gate module=entitlement status=rejected tier={} used={}",
                    snapshot.tier.as_str(),
                    err.used
                );
                err
            })
    }

    /// Admits advanced analysis for premium sessions only.
    pub async fn authorize_analysis(&self, session: &Session) -> Result<(), QuotaExceededError> {
        let snapshot = self.snapshot(session).await;
        snapshot.require_advanced_analysis().map_err(|err| {
            info!(
                "event=analysis_gate module=entitlement status=rejected tier={}",
                snapshot.tier.as_str()
            );
            err
        })
    }

    /// Requests cancellation at period end.
    ///
    /// On acknowledgement the cached snapshot shows `cancel_at_period_end`
    /// until the next authoritative refresh.
    pub async fn cancel(&self, session: &Session) -> Result<(), PlanChangeError> {
        self.change_plan(session, true).await
    }

    /// Withdraws a pending cancellation.
    pub async fn resume(&self, session: &Session) -> Result<(), PlanChangeError> {
        self.change_plan(session, false).await
    }

    async fn change_plan(&self, session: &Session, cancel: bool) -> Result<(), PlanChangeError> {
        let user_id = authenticated_user(session).ok_or(PlanChangeError::NotAuthenticated)?;
        let action = if cancel { "cancel" } else { "resume" };

        let result = if cancel {
            self.service.cancel(user_id).await
        } else {
            self.service.resume(user_id).await
        };
        if let Err(err) = result {
            warn!(
                "event=plan_change module=entitlement status=error action={action} error={err}"
            );
            return Err(PlanChangeError::Service(err));
        }

        let mut cache = self.lock();
        if let Some(entry) = cache.entry.as_mut().filter(|entry| &entry.user_id == user_id) {
            entry.snapshot.cancel_at_period_end = cancel;
        }
        info!("event=plan_change module=entitlement status=ok action={action}");
        Ok(())
    }

    async fn recompute(&self, user_id: &UserId, generation: u64) -> EntitlementSnapshot {
        let snapshot = match self.fetch(user_id).await {
            Ok(record) => derive(record.as_ref()),
            Err(err) => {
                // Not cached: the next read retries the fetch.
                warn!(
                    "event=entitlement_fetch module=entitlement status=degraded fallback=free error={err}"
                );
                return EntitlementSnapshot::free();
            }
        };

        let mut cache = self.lock();
        if cache.generation == generation {
            cache.entry = Some(CachedSnapshot {
                user_id: user_id.clone(),
                snapshot: snapshot.clone(),
            });
            debug!(
                "event=entitlement_cache module=entitlement status=stored tier={}",
                snapshot.tier.as_str()
            );
        }
        snapshot
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn authenticated_user(session: &Session) -> Option<&UserId> {
    session.user_id().filter(|_| session.is_authenticated())
}
