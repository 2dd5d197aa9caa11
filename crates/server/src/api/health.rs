use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use msgbridge_identity::IdentifierType;
use msgbridge_state::key::{KeyKind, StateKey};

use crate::state::AppState;

async fn component_status(label: &str, ok: bool) -> (&'static str, bool) {
    if !ok {
        tracing::warn!(component = label, "health check failed");
    }
    (if ok { "ok" } else { "unavailable" }, ok)
}

/// `GET /health` -- aggregate per-dependency health, the way the teacher's
/// health endpoint reports a metrics snapshot, but one boolean probe per
/// collaborator instead of dispatch counters.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let kv_ok = state.state_store.get(&StateKey::new(KeyKind::Lock, "__health__")).await.is_ok();
    let identity_ok = state.identity.get_user("health-check-probe", IdentifierType::Phone).await.is_ok();
    let backend_ok = state.mediator.conversation_id("+10000000000").await.is_ok();
    let audit_ok = state.audit.query(&msgbridge_audit::AuditQuery { limit: Some(1), ..Default::default() }).await.is_ok();
    let active_threads = state.state_store.scan_keys_by_kind(KeyKind::ConversationId).await.map(|rows| rows.len()).unwrap_or(0);

    let (kv_status, kv_healthy) = component_status("kv", kv_ok).await;
    let (identity_status, identity_healthy) = component_status("identity", identity_ok).await;
    let (backend_status, backend_healthy) = component_status("backend", backend_ok).await;
    let (audit_status, audit_healthy) = component_status("audit", audit_ok).await;
    // The email provider has no side-effect-free probe; report configured-only.
    let email_status = "ok";

    let all_healthy = kv_healthy && identity_healthy && backend_healthy && audit_healthy;

    let body = serde_json::json!({
        "status": if all_healthy { "ok" } else { "degraded" },
        "components": {
            "kv": kv_status,
            "identity": identity_status,
            "backend": backend_status,
            "email": email_status,
            "audit": audit_status,
        },
        "active_conversation_threads": active_threads,
    });

    let status = if all_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body))
}
