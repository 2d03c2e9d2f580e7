//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `allerpaws_core` linkage.
//! - Print the tier table so quota constants can be eyeballed.

use allerpaws_core::{
    derive, EntitlementSnapshot, PlanId, SubscriptionRecord, SubscriptionStatus, UserId,
};

fn main() {
    println!("allerpaws_core ping={}", allerpaws_core::ping());
    println!("allerpaws_core version={}", allerpaws_core::core_version());
    println!(
        "allerpaws_core default_log_level={}",
        allerpaws_core::default_log_level()
    );

    print_row("anonymous", &EntitlementSnapshot::free());
    for plan_id in [PlanId::Free, PlanId::Monthly, PlanId::Annual] {
        let record = SubscriptionRecord {
            user_id: UserId::new("smoke"),
            plan_id,
            status: SubscriptionStatus::Active,
            cancel_at_period_end: false,
            created_at: 0,
        };
        print_row(plan_id.as_str(), &derive(Some(&record)));
    }
}

fn print_row(label: &str, snapshot: &EntitlementSnapshot) {
    println!(
        "tier label={label} tier={} plan=\"{}\" max_pets={} max_monthly_entries={} advanced_analysis={}",
        snapshot.tier.as_str(),
        snapshot.plan_name(),
        snapshot.max_resources,
        snapshot.max_monthly_entries,
        snapshot.advanced_analysis
    );
}
