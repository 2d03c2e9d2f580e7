use allerpaws_core::{
    EntitlementEngine, InMemorySubscriptionService, PlanChangeError, PlanId, Quota, QuotaKind,
    RawSubscriptionRow, Session, SubscriptionError, SubscriptionRecord, SubscriptionService,
    SubscriptionStatus, Tier, UserId,
};
use std::sync::Arc;

fn row(user: &str, plan_id: PlanId, status: SubscriptionStatus, created_at: i64) -> SubscriptionRecord {
    SubscriptionRecord {
        user_id: UserId::new(user),
        plan_id,
        status,
        cancel_at_period_end: false,
        created_at,
    }
}

fn engine_with(rows: &[SubscriptionRecord]) -> (Arc<InMemorySubscriptionService>, EntitlementEngine) {
    let service = Arc::new(InMemorySubscriptionService::new());
    for record in rows {
        service.insert(record);
    }
    let engine = EntitlementEngine::new(service.clone());
    (service, engine)
}

fn session(user: &str) -> Session {
    Session::authenticated(UserId::new(user))
}

#[tokio::test]
async fn anonymous_session_is_free_without_fetch() {
    let (service, engine) = engine_with(&[]);

    for session in [
        Session::anonymous(),
        Session::pending_verification("owner@example.com"),
    ] {
        let snapshot = engine.snapshot(&session).await;
        assert_eq!(snapshot.tier, Tier::Free);
        assert_eq!(snapshot.max_resources, Quota::Limited(2));
        assert_eq!(snapshot.max_monthly_entries, Quota::Limited(30));
        assert!(!snapshot.advanced_analysis);
    }
    assert_eq!(service.fetch_calls(), 0);
}

#[tokio::test]
async fn active_annual_plan_is_premium_and_memoized() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Annual, SubscriptionStatus::Active, 10)]);

    let first = engine.snapshot(&session("u1")).await;
    assert_eq!(first.tier, Tier::Premium);
    assert_eq!(first.max_resources, Quota::Unbounded);
    assert_eq!(first.max_monthly_entries, Quota::Unbounded);
    assert!(first.advanced_analysis);
    assert_eq!(first.plan_name(), "Premium Annual");

    let second = engine.snapshot(&session("u1")).await;
    assert_eq!(first, second);
    assert_eq!(service.fetch_calls(), 1);
    assert_eq!(engine.cached(&UserId::new("u1")), Some(first));
}

#[tokio::test]
async fn user_without_rows_is_free() {
    let (_, engine) = engine_with(&[]);

    let snapshot = engine.snapshot(&session("u1")).await;
    assert_eq!(snapshot.tier, Tier::Free);
    assert_eq!(snapshot.plan, None);
    assert_eq!(snapshot.plan_name(), "Free Plan");
}

#[tokio::test]
async fn fetch_failure_degrades_to_free_and_retries_later() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);
    service.set_offline(true);

    let degraded = engine.snapshot(&session("u1")).await;
    assert_eq!(degraded.tier, Tier::Free);
    assert_eq!(engine.cached(&UserId::new("u1")), None);

    service.set_offline(false);
    let recovered = engine.snapshot(&session("u1")).await;
    assert_eq!(recovered.tier, Tier::Premium);
    assert_eq!(service.fetch_calls(), 2);
}

#[tokio::test]
async fn identity_change_recomputes() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);

    assert!(engine.snapshot(&session("u1")).await.is_premium());
    assert!(!engine.snapshot(&session("u2")).await.is_premium());
    assert_eq!(service.fetch_calls(), 2);
    assert_eq!(engine.cached(&UserId::new("u1")), None);
}

#[tokio::test]
async fn newest_row_is_authoritative() {
    let (_, engine) = engine_with(&[
        row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10),
        row("u1", PlanId::Monthly, SubscriptionStatus::Canceled, 20),
    ]);
    let snapshot = engine.snapshot(&session("u1")).await;
    assert_eq!(snapshot.tier, Tier::Free);
    assert_eq!(snapshot.plan, Some(PlanId::Monthly));

    let (_, engine) = engine_with(&[
        row("u1", PlanId::Monthly, SubscriptionStatus::Canceled, 10),
        row("u1", PlanId::Annual, SubscriptionStatus::Active, 20),
    ]);
    assert!(engine.snapshot(&session("u1")).await.is_premium());
}

#[tokio::test]
async fn past_due_and_free_plan_are_not_premium() {
    let (_, engine) = engine_with(&[row("u1", PlanId::Annual, SubscriptionStatus::PastDue, 10)]);
    assert_eq!(engine.snapshot(&session("u1")).await.tier, Tier::Free);

    let (_, engine) = engine_with(&[row("u1", PlanId::Free, SubscriptionStatus::Active, 10)]);
    assert_eq!(engine.snapshot(&session("u1")).await.tier, Tier::Free);
}

#[tokio::test]
async fn unknown_backend_values_fall_back_to_free() {
    let service = Arc::new(InMemorySubscriptionService::new());
    service.insert_raw(RawSubscriptionRow {
        user_id: "u1".to_string(),
        plan_id: "annual".to_string(),
        status: "trialing".to_string(),
        cancel_at_period_end: false,
        created_at: 10,
    });
    let engine = EntitlementEngine::new(service);

    assert_eq!(engine.snapshot(&session("u1")).await.tier, Tier::Free);
}

#[tokio::test]
async fn cancel_sets_flag_until_refresh() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);
    let user = session("u1");
    assert!(!engine.snapshot(&user).await.cancel_at_period_end);

    engine.cancel(&user).await.unwrap();
    let cached = engine.cached(&UserId::new("u1")).unwrap();
    assert!(cached.cancel_at_period_end);
    assert!(cached.is_premium());
    assert_eq!(service.fetch_calls(), 1);

    let refreshed = engine.refresh(&user).await;
    assert!(refreshed.cancel_at_period_end);
    assert_eq!(service.fetch_calls(), 2);

    engine.resume(&user).await.unwrap();
    assert!(!engine.snapshot(&user).await.cancel_at_period_end);
}

#[tokio::test]
async fn failed_cancel_leaves_cache_untouched() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);
    let user = session("u1");
    engine.snapshot(&user).await;

    service.set_offline(true);
    let err = engine.cancel(&user).await.unwrap_err();
    assert!(matches!(
        err,
        PlanChangeError::Service(SubscriptionError::Unavailable(_))
    ));
    assert!(!engine.cached(&UserId::new("u1")).unwrap().cancel_at_period_end);
}

#[tokio::test]
async fn plan_changes_require_authentication() {
    let (_, engine) = engine_with(&[]);
    assert_eq!(
        engine.cancel(&Session::anonymous()).await,
        Err(PlanChangeError::NotAuthenticated)
    );
}

#[tokio::test]
async fn cancel_without_subscription_is_rejected() {
    let (_, engine) = engine_with(&[]);
    let err = engine.cancel(&session("u1")).await.unwrap_err();
    assert_eq!(
        err,
        PlanChangeError::Service(SubscriptionError::NotSubscribed(UserId::new("u1")))
    );
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let (service, engine) = engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);
    engine.snapshot(&session("u1")).await;

    engine.invalidate();
    assert_eq!(engine.cached(&UserId::new("u1")), None);
    engine.snapshot(&session("u1")).await;
    assert_eq!(service.fetch_calls(), 2);
}

#[tokio::test]
async fn unreadable_older_row_does_not_hide_newer_premium() {
    let service = Arc::new(InMemorySubscriptionService::new());
    service.insert_raw(RawSubscriptionRow {
        user_id: "u1".to_string(),
        plan_id: "monthly".to_string(),
        status: "trialing".to_string(),
        cancel_at_period_end: false,
        created_at: 1,
    });
    service.insert(&row("u1", PlanId::Annual, SubscriptionStatus::Active, 1_000));
    let engine = EntitlementEngine::new(service.clone());

    let snapshot = engine.snapshot(&session("u1")).await;
    assert_eq!(snapshot.tier, Tier::Premium);
    assert_eq!(snapshot.plan, Some(PlanId::Annual));

    let history = service.fetch_history(&UserId::new("u1")).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn unreadable_newest_row_is_not_replaced_by_older_premium() {
    let service = Arc::new(InMemorySubscriptionService::new());
    service.insert(&row("u1", PlanId::Annual, SubscriptionStatus::Active, 1));
    service.insert_raw(RawSubscriptionRow {
        user_id: "u1".to_string(),
        plan_id: "annual".to_string(),
        status: "trialing".to_string(),
        cancel_at_period_end: false,
        created_at: 1_000,
    });
    let engine = EntitlementEngine::new(service);

    assert_eq!(engine.snapshot(&session("u1")).await.tier, Tier::Free);
    assert_eq!(engine.cached(&UserId::new("u1")), None);
}

#[tokio::test]
async fn free_tier_entry_and_analysis_gates() {
    let (_, engine) = engine_with(&[]);
    let session = session("u1");

    engine.authorize_entry(&session, 29).await.unwrap();
    let err = engine.authorize_entry(&session, 30).await.unwrap_err();
    assert_eq!(err.kind, QuotaKind::MonthlyEntries);
    assert_eq!((err.limit, err.used), (30, 30));

    let err = engine.authorize_analysis(&session).await.unwrap_err();
    assert_eq!(err.kind, QuotaKind::AdvancedAnalysis);
    assert_eq!(
        engine.authorize_analysis(&Session::anonymous()).await.unwrap_err().kind,
        QuotaKind::AdvancedAnalysis
    );
}

#[tokio::test]
async fn premium_entry_and_analysis_gates_are_open() {
    let (service, engine) =
        engine_with(&[row("u1", PlanId::Monthly, SubscriptionStatus::Active, 10)]);
    let session = session("u1");

    engine.authorize_entry(&session, 10_000).await.unwrap();
    engine.authorize_analysis(&session).await.unwrap();
    assert_eq!(service.fetch_calls(), 1);
}
