//! `/v1/admin/bootstrap` and `/v1/admin/session/*` — everything an operator
//! does before they hold a valid session cookie.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{client_id, require_session};
use crate::cookies::{session_clear_cookie, session_cookie, with_rotated_cookie};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Serialize)]
struct BootstrapStatusResponse {
    #[serde(rename = "needsBootstrap")]
    needs_bootstrap: bool,
}

/// `GET /v1/admin/bootstrap` — whether an admin user has been created yet.
pub async fn bootstrap_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BootstrapStatusResponse>, AppError> {
    let needs_bootstrap = pincer_auth::needs_bootstrap(state.store)?;
    Ok(Json(BootstrapStatusResponse { needs_bootstrap }))
}

#[derive(Deserialize)]
pub struct BootstrapRequest {
    token: String,
    username: String,
    password: String,
}

/// `POST /v1/admin/bootstrap` — create the singleton admin user.
pub async fn bootstrap(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BootstrapRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let username = pincer_auth::bootstrap(
        state.store,
        state.config.bootstrap_token.expose(),
        &body.token,
        &body.username,
        &body.password,
    )?;
    Ok(Json(serde_json::json!({ "ok": true, "username": username })))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

fn session_response(outcome: &pincer_auth::SessionOutcome) -> Response {
    with_rotated_cookie(
        outcome,
        serde_json::json!({
            "ok": true,
            "username": outcome.username,
            "csrfToken": outcome.csrf_token,
            "expiresAt": outcome.absolute_expiry_ms,
            "idleExpiresAt": outcome.idle_expiry_ms,
        }),
    )
}

/// `POST /v1/admin/session/login`.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let client = client_id(&headers);
    let outcome = pincer_auth::login(state.store, &body.username, &body.password, &client)?;
    Ok(session_response(&outcome))
}

/// `GET /v1/admin/session/me`. Like every other session-gated route, this
/// also refreshes `lastSeen`/`idleExpiry` and, every 15 minutes, rotates
/// the cookie (see [`crate::cookies::with_rotated_cookie`]).
pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Response, AppError> {
    let outcome = require_session(&state, &headers, false)?;
    Ok(session_response(&outcome))
}

/// `POST /v1/admin/session/logout`.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    if let Some(session_id) = session_cookie(&headers) {
        pincer_auth::logout(state.store, &session_id)?;
    }
    Ok((StatusCode::OK, [("set-cookie", session_clear_cookie())], Json(serde_json::json!({ "ok": true }))))
}
