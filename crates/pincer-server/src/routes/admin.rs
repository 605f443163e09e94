//! Every `/v1/admin/*` route that requires an existing session: secrets,
//! runtime rotation, pairing, adapter management, metrics, and audit.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use pincer_auth::PairingPayload;
use pincer_error::ErrorKind;
use pincer_registry::ApplyRequest;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::require_session;
use crate::cookies::with_rotated_cookie;
use crate::error::AppError;
use crate::state::AppState;

/// `GET /v1/admin/doctor` — a handful of cheap readiness checks.
pub async fn doctor(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;

    let runtime_key_present = state.runtime_key().is_some();
    let kek_hmac_binding_present =
        !state.vault.resolve(&state.config.default_hmac_secret_binding)?.is_empty();
    Ok(with_rotated_cookie(
        &session,
        serde_json::json!({
            "ok": true,
            "checks": {
                "runtimeKeyMinted": runtime_key_present,
                "hmacSecretConfigured": kek_hmac_binding_present,
            },
        }),
    ))
}

/// `GET /v1/admin/metrics`.
pub async fn metrics(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "recent": state.metrics.snapshot() })))
}

#[derive(Deserialize)]
pub struct SecretHints {
    #[serde(default)]
    hint: Vec<String>,
}

/// `GET /v1/admin/secrets`.
pub async fn list_secrets(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(hints): Query<SecretHints>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    let listing = state.vault.list_metadata(&hints.hint)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "secrets": listing })))
}

#[derive(Deserialize)]
pub struct PutSecretRequest {
    value: String,
}

/// `PUT /v1/admin/secrets/:binding`.
pub async fn put_secret(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(binding): Path<String>,
    axum::Json(body): axum::Json<PutSecretRequest>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    state.vault.put(&binding, &body.value, &session.username)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true })))
}

/// `DELETE /v1/admin/secrets/:binding`.
pub async fn delete_secret(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(binding): Path<String>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    state.vault.delete(&binding)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true })))
}

/// `POST /v1/admin/runtime/rotate`.
pub async fn rotate_runtime(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    let result = state.rotate_runtime_key(&session.username)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "rotation": result })))
}

#[derive(Deserialize)]
pub struct PairingGenerateRequest {
    #[serde(rename = "workerUrl")]
    worker_url: String,
}

/// `POST /v1/admin/pairing/generate` — mints the runtime key material a new
/// worker will receive once it consumes the code.
pub async fn generate_pairing_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<PairingGenerateRequest>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;

    if state.runtime_key().is_none() {
        return Err(AppError::from(ErrorKind::MissingRuntimeConfig));
    }
    let key_secret = state.vault.resolve(&state.config.default_key_secret_binding)?;
    let hmac_secret = state.vault.resolve(&state.config.default_hmac_secret_binding)?;
    if key_secret.is_empty() || hmac_secret.is_empty() {
        return Err(AppError::from(ErrorKind::MissingRuntimeConfig));
    }

    let (code, ttl_seconds) = pincer_auth::create_pairing_code(
        state.store,
        PairingPayload { worker_url: body.worker_url, runtime_key: key_secret, hmac_secret },
    )?;
    Ok(with_rotated_cookie(
        &session,
        serde_json::json!({ "ok": true, "code": code, "expiresInSeconds": ttl_seconds }),
    ))
}

/// `GET /v1/admin/adapters`.
pub async fn list_adapters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    let adapters = state.registry.list_adapters(false)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "adapters": adapters })))
}

/// `GET /v1/admin/adapters/proposals`.
pub async fn list_proposals(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    let proposals = state.registry.list_proposals()?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "proposals": proposals })))
}

/// `GET /v1/admin/adapters/proposals/:id`.
pub async fn get_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<String>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    let proposal = state.registry.get_proposal(&proposal_id)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "proposal": proposal })))
}

#[derive(Deserialize)]
pub struct RejectProposalRequest {
    reason: Option<String>,
}

/// `POST /v1/admin/adapters/proposals/:id/reject`.
pub async fn reject_proposal(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(proposal_id): Path<String>,
    axum::Json(body): axum::Json<RejectProposalRequest>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    let outcome = state.registry.reject_proposal(&proposal_id, body.reason.as_deref())?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "rejection": outcome })))
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum ApplyBody {
    Proposal { #[serde(rename = "proposalId")] proposal_id: String },
    Manifest { manifest: Value },
}

/// `POST /v1/admin/adapters/apply`.
pub async fn apply_adapter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ApplyBody>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    let request = match body {
        ApplyBody::Proposal { proposal_id } => ApplyRequest::Proposal(proposal_id),
        ApplyBody::Manifest { manifest } => ApplyRequest::Manifest(manifest),
    };
    let (outcome, entry) = state.registry.apply(request)?;
    Ok(with_rotated_cookie(
        &session,
        serde_json::json!({ "ok": true, "outcome": outcome.as_str(), "active": entry }),
    ))
}

/// `POST /v1/admin/adapters/:id/enable`.
pub async fn enable_adapter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(adapter_id): Path<String>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    let entry = state.registry.enable(&adapter_id)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "active": entry })))
}

/// `POST /v1/admin/adapters/:id/disable`.
pub async fn disable_adapter(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(adapter_id): Path<String>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, true)?;
    let entry = state.registry.disable(&adapter_id)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "active": entry })))
}

#[derive(Deserialize)]
pub struct AuditQuery {
    since: Option<String>,
    limit: Option<usize>,
}

/// `GET /v1/admin/audit`.
pub async fn audit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AuditQuery>,
) -> Result<Response, AppError> {
    let session = require_session(&state, &headers, false)?;
    let events = state.registry.list_audit_events(query.since.as_deref(), query.limit)?;
    Ok(with_rotated_cookie(&session, serde_json::json!({ "ok": true, "events": events })))
}
