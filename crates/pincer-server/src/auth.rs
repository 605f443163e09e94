//! Request-level auth helpers shared by every route module: pulling the
//! signed-request headers and session cookie/CSRF header out of an `axum`
//! [`HeaderMap`], and the two gating checks every protected handler runs.

use axum::http::HeaderMap;
use pincer_auth::{SessionOutcome, SignedRequestHeaders};
use pincer_error::ApiError;

use crate::cookies;
use crate::state::AppState;

/// Build [`SignedRequestHeaders`] from the four headers `pincer_auth::verify`
/// cares about.
pub fn signed_headers(headers: &HeaderMap) -> SignedRequestHeaders<'_> {
    SignedRequestHeaders {
        authorization: headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()),
        timestamp: headers.get("x-pincer-timestamp").and_then(|v| v.to_str().ok()),
        body_sha256: headers.get("x-pincer-body-sha256").and_then(|v| v.to_str().ok()),
        signature: headers.get("x-pincer-signature").and_then(|v| v.to_str().ok()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Verify a signed runtime-key request against the process's current
/// runtime key record.
pub fn require_runtime(
    state: &AppState,
    method: &str,
    path: &str,
    body: &[u8],
    headers: &HeaderMap,
) -> Result<String, ApiError> {
    let runtime_key = state.runtime_key();
    pincer_auth::verify(runtime_key.as_ref(), state.vault, method, path, body, signed_headers(headers))
}

/// Enforce an existing admin session, optionally requiring the CSRF header
/// to match (every non-idempotent `/v1/admin/*` route besides
/// login/logout/bootstrap).
pub fn require_session(
    state: &AppState,
    headers: &HeaderMap,
    require_csrf: bool,
) -> Result<SessionOutcome, ApiError> {
    let session_id = cookies::session_cookie(headers);
    let csrf = header_str(headers, "x-pincer-csrf");
    pincer_auth::enforce_session(state.store, session_id.as_deref(), csrf, require_csrf)
}

/// The lockout-keying client id for a login attempt.
pub fn client_id(headers: &HeaderMap) -> String {
    pincer_auth::client_id(header_str(headers, "cf-connecting-ip"))
}
