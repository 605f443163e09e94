//! Signed-request-gated routes: listing enabled adapters, submitting a
//! proposal, and the egress proxy call itself.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Json;
use pincer_error::ErrorKind;
use pincer_proxy::{Proxy, ProxyRequest};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::{require_runtime, signed_headers};
use crate::error::AppError;
use crate::state::AppState;

/// `GET /v1/adapters` — every currently enabled adapter, runtime-key gated.
pub async fn list_adapters(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, AppError> {
    require_runtime(&state, method.as_str(), uri.path(), &body, &headers)?;
    let adapters = state.registry.list_adapters(true)?;
    Ok(Json(serde_json::json!({ "ok": true, "adapters": adapters })))
}

#[derive(Deserialize)]
pub struct SubmitProposalRequest {
    manifest: Value,
}

/// `POST /v1/adapters/proposals` — submit a manifest for admin review.
pub async fn submit_proposal(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let key_id = require_runtime(&state, method.as_str(), uri.path(), &body, &headers)?;
    let request: SubmitProposalRequest =
        serde_json::from_slice(&body).map_err(|_| AppError::from(ErrorKind::InvalidPayload))?;
    let summary = state.registry.submit_proposal(&request.manifest, &key_id)?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true, "proposal": summary }))))
}

/// `POST /v1/adapter/:adapter/:action` — the egress proxy call. Auth,
/// validation, rate limiting, and forwarding all live in
/// [`pincer_proxy::Proxy::handle`]; this handler is just the `axum` seam.
pub async fn proxy_call(
    State(state): State<Arc<AppState>>,
    Path((adapter_id, action_name)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<Value>, AppError> {
    let runtime_key = state.runtime_key();
    let proxy = Proxy::new(state.registry, state.vault, &state.limiter, &state.metrics, &state.http);
    let response = proxy
        .handle(
            runtime_key.as_ref(),
            ProxyRequest {
                method: "POST",
                path: uri.path(),
                adapter_id: &adapter_id,
                action_name: &action_name,
                raw_body: &body,
                headers: signed_headers(&headers),
            },
        )
        .await?;
    Ok(Json(response.body))
}
