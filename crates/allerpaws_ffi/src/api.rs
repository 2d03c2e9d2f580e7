//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose local-only, use-case-level functions to Dart via FRB.
//! - Let the UI stash and restore the onboarding draft before an account exists.
//! - Preview the entitlements a plan/status pair would grant and gate
//!   diary entries and analysis on them.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Failures are reported inside response envelopes, never thrown.
//! - Draft payloads cross the boundary as JSON text and stay opaque here.

use allerpaws_core::{
    core_version as core_version_inner, derive, init_logging as init_logging_inner,
    ping as ping_inner, DraftPayload, EntitlementSnapshot, PendingDraft, PendingDraftStore,
    PlanId, Quota, SqliteSlotStore, SubscriptionParseError, SubscriptionRecord,
    SubscriptionStatus, UserId,
};
use log::warn;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

const LOCAL_DB_FILE_NAME: &str = "allerpaws_local.sqlite3";
static LOCAL_DB_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Reconfiguration attempts with different level or directory return error.
/// - Returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err.to_string(),
    }
}

/// Response envelope for draft slot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Draft ID affected by the operation, when one exists.
    pub draft_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl DraftActionResponse {
    fn success(message: impl Into<String>, draft_id: Option<String>) -> Self {
        Self {
            ok: true,
            draft_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            draft_id: None,
            message: message.into(),
        }
    }
}

/// Stored draft as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLoadResponse {
    pub ok: bool,
    pub draft_id: Option<String>,
    /// Draft payload as JSON text; `None` when the slot is empty.
    pub payload_json: Option<String>,
    /// Unix epoch milliseconds of the stored draft.
    pub created_at: Option<i64>,
    pub message: String,
}

/// Quotas a plan/status pair would grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementPreview {
    /// `free|premium`.
    pub tier: String,
    /// User-facing plan label.
    pub plan_name: String,
    /// `None` means unbounded.
    pub max_pets: Option<u32>,
    /// `None` means unbounded.
    pub max_monthly_entries: Option<u32>,
    pub advanced_analysis: bool,
    pub cancel_at_period_end: bool,
    pub message: String,
}

/// Replaces the pending draft with `payload_json`.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Rejects payloads that are not valid JSON without touching the slot.
/// - Returns the new draft ID on success.
#[flutter_rust_bridge::frb(sync)]
pub fn draft_save(payload_json: String) -> DraftActionResponse {
    let value = match serde_json::from_str::<serde_json::Value>(payload_json.trim()) {
        Ok(value) => value,
        Err(err) => return DraftActionResponse::failure(format!("draft_save failed: {err}")),
    };
    let draft = PendingDraft::new(DraftPayload::new(value));

    match with_draft_store("draft_save", |store| {
        store.save(&draft).map_err(|err| err.to_string())
    }) {
        Ok(()) => DraftActionResponse::success("Draft saved.", Some(draft.id.to_string())),
        Err(err) => DraftActionResponse::failure(format!("draft_save failed: {err}")),
    }
}

/// Reads the pending draft, if any.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - An empty slot is a success with `payload_json = None`.
#[flutter_rust_bridge::frb(sync)]
pub fn draft_load() -> DraftLoadResponse {
    match with_draft_store("draft_load", |store| {
        store.load().map_err(|err| err.to_string())
    }) {
        Ok(Some(draft)) => match serde_json::to_string(draft.payload.as_value()) {
            Ok(payload_json) => DraftLoadResponse {
                ok: true,
                draft_id: Some(draft.id.to_string()),
                payload_json: Some(payload_json),
                created_at: Some(draft.created_at),
                message: "Draft loaded.".to_string(),
            },
            Err(err) => load_failure(format!("draft_load failed: {err}")),
        },
        Ok(None) => DraftLoadResponse {
            ok: true,
            draft_id: None,
            payload_json: None,
            created_at: None,
            message: "No pending draft.".to_string(),
        },
        Err(err) => load_failure(format!("draft_load failed: {err}")),
    }
}

/// Discards the pending draft. Clearing an empty slot succeeds.
#[flutter_rust_bridge::frb(sync)]
pub fn draft_clear() -> DraftActionResponse {
    match with_draft_store("draft_clear", |store| {
        store.clear().map_err(|err| err.to_string())
    }) {
        Ok(()) => DraftActionResponse::success("Draft cleared.", None),
        Err(err) => DraftActionResponse::failure(format!("draft_clear failed: {err}")),
    }
}

/// Derives the entitlement snapshot for a plan/status pair.
///
/// Unknown plan or status strings yield the free tier with a diagnostic
/// message, matching how unreadable backend rows are treated.
#[flutter_rust_bridge::frb(sync)]
pub fn entitlement_preview(
    plan_id: String,
    status: String,
    cancel_at_period_end: bool,
) -> EntitlementPreview {
    match preview_snapshot(&plan_id, &status, cancel_at_period_end) {
        Ok(snapshot) => to_preview(&snapshot, "Preview derived.".to_string()),
        Err(err) => to_preview(
            &EntitlementSnapshot::free(),
            format!("entitlement_preview fell back to free: {err}"),
        ),
    }
}

/// Whether a diary entry or an analysis run is admitted for a plan/status pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryGateResponse {
    pub entry_allowed: bool,
    pub analysis_allowed: bool,
    /// Upgrade prompt for the first refused gate, empty when both pass.
    pub message: String,
}

/// Checks the monthly entry ceiling and the analysis flag before the UI
/// offers either action.
///
/// # FFI contract
/// - Sync call, no I/O.
/// - Unknown plan or status strings are gated as the free tier.
#[flutter_rust_bridge::frb(sync)]
pub fn entry_gate(plan_id: String, status: String, entries_this_month: u32) -> EntryGateResponse {
    let snapshot = preview_snapshot(&plan_id, &status, false).unwrap_or_else(|err| {
        warn!("event=entry_gate module=ffi status=degraded fallback=free error={err}");
        EntitlementSnapshot::free()
    });
    let entry = snapshot.check_monthly_entry_quota(entries_this_month as usize);
    let analysis = snapshot.require_advanced_analysis();
    let message = match (&entry, &analysis) {
        (Err(err), _) | (Ok(()), Err(err)) => err.to_string(),
        (Ok(()), Ok(())) => String::new(),
    };
    EntryGateResponse {
        entry_allowed: entry.is_ok(),
        analysis_allowed: analysis.is_ok(),
        message,
    }
}

fn preview_snapshot(
    plan_id: &str,
    status: &str,
    cancel_at_period_end: bool,
) -> Result<EntitlementSnapshot, SubscriptionParseError> {
    let record = SubscriptionRecord {
        user_id: UserId::new("preview"),
        plan_id: PlanId::parse(plan_id)?,
        status: SubscriptionStatus::parse(status)?,
        cancel_at_period_end,
        created_at: 0,
    };
    Ok(derive(Some(&record)))
}

fn to_preview(snapshot: &EntitlementSnapshot, message: String) -> EntitlementPreview {
    EntitlementPreview {
        tier: snapshot.tier.as_str().to_string(),
        plan_name: snapshot.plan_name().to_string(),
        max_pets: quota_limit(snapshot.max_resources),
        max_monthly_entries: quota_limit(snapshot.max_monthly_entries),
        advanced_analysis: snapshot.advanced_analysis,
        cancel_at_period_end: snapshot.cancel_at_period_end,
        message,
    }
}

fn quota_limit(quota: Quota) -> Option<u32> {
    match quota {
        Quota::Limited(max) => Some(max),
        Quota::Unbounded => None,
    }
}

fn load_failure(message: String) -> DraftLoadResponse {
    DraftLoadResponse {
        ok: false,
        draft_id: None,
        payload_json: None,
        created_at: None,
        message,
    }
}

fn resolve_local_db_path() -> PathBuf {
    LOCAL_DB_PATH
        .get_or_init(|| {
            if let Ok(raw) = std::env::var("ALLERPAWS_DB_PATH") {
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    return PathBuf::from(trimmed);
                }
            }
            std::env::temp_dir().join(LOCAL_DB_FILE_NAME)
        })
        .clone()
}

fn with_draft_store<T>(
    op: &'static str,
    f: impl FnOnce(&PendingDraftStore) -> Result<T, String>,
) -> Result<T, String> {
    let db_path = resolve_local_db_path();
    let result = SqliteSlotStore::open(&db_path)
        .map_err(|err| format!("local DB open failed: {err}"))
        .and_then(|slot| f(&PendingDraftStore::new(Arc::new(slot))));
    if let Err(err) = &result {
        warn!("event=ffi_call module=ffi status=error op={op} error={err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, draft_clear, draft_load, draft_save, entitlement_preview, entry_gate,
        init_logging, ping,
    };

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    // One test owns the shared slot file so parallel tests cannot interleave.
    #[test]
    fn draft_slot_save_load_replace_clear() {
        let rejected = draft_save("{not json".to_string());
        assert!(!rejected.ok);
        assert!(rejected.message.starts_with("draft_save failed"));

        let first = draft_save(r#"{"name":"A","species":"cat"}"#.to_string());
        assert!(first.ok, "{}", first.message);
        let second = draft_save(r#"{"name":"B","species":"cat"}"#.to_string());
        assert!(second.ok, "{}", second.message);

        let loaded = draft_load();
        assert!(loaded.ok, "{}", loaded.message);
        assert_eq!(loaded.draft_id, second.draft_id);
        let payload: serde_json::Value =
            serde_json::from_str(loaded.payload_json.as_deref().expect("payload")).unwrap();
        assert_eq!(payload["name"], "B");
        assert!(loaded.created_at.is_some());

        assert!(draft_clear().ok);
        let empty = draft_load();
        assert!(empty.ok);
        assert_eq!(empty.payload_json, None);
        assert!(draft_clear().ok);
    }

    #[test]
    fn entitlement_preview_maps_active_premium_to_unbounded() {
        let preview = entitlement_preview("annual".to_string(), "active".to_string(), true);
        assert_eq!(preview.tier, "premium");
        assert_eq!(preview.plan_name, "Premium Annual");
        assert_eq!(preview.max_pets, None);
        assert_eq!(preview.max_monthly_entries, None);
        assert!(preview.advanced_analysis);
        assert!(preview.cancel_at_period_end);
    }

    #[test]
    fn entitlement_preview_inactive_status_is_free() {
        let preview = entitlement_preview("monthly".to_string(), "past_due".to_string(), false);
        assert_eq!(preview.tier, "free");
        assert_eq!(preview.plan_name, "Free Plan");
        assert_eq!(preview.max_pets, Some(2));
        assert_eq!(preview.max_monthly_entries, Some(30));
        assert!(!preview.advanced_analysis);
    }

    #[test]
    fn entitlement_preview_unknown_values_fall_back_to_free() {
        let preview = entitlement_preview("lifetime".to_string(), "active".to_string(), false);
        assert_eq!(preview.tier, "free");
        assert!(preview.message.contains("fell back to free"));
    }

    #[test]
    fn entry_gate_blocks_free_tier_at_thirty_entries() {
        let open = entry_gate("free".to_string(), "active".to_string(), 29);
        assert!(open.entry_allowed);
        assert!(!open.analysis_allowed);
        assert!(open.message.contains("premium"));

        let full = entry_gate("free".to_string(), "active".to_string(), 30);
        assert!(!full.entry_allowed);
        assert!(full.message.contains("30/30"));
    }

    #[test]
    fn entry_gate_opens_everything_for_active_premium() {
        let gate = entry_gate("monthly".to_string(), "active".to_string(), 500);
        assert!(gate.entry_allowed);
        assert!(gate.analysis_allowed);
        assert!(gate.message.is_empty());
    }

    #[test]
    fn entry_gate_treats_unknown_plan_as_free() {
        let gate = entry_gate("lifetime".to_string(), "active".to_string(), 30);
        assert!(!gate.entry_allowed);
        assert!(!gate.analysis_allowed);
    }
}
