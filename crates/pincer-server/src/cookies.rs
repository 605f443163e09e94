//! `Set-Cookie` construction and parsing for the admin session cookie.
//!
//! [`pincer_auth::session`] deliberately never touches `axum`/cookie-jar
//! types (see its `SessionOutcome` doc comment); this module is the thin
//! seam that does.

use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pincer_auth::SessionOutcome;

const SESSION_COOKIE: &str = "pincer_session";

/// Wrap a JSON body with the session's rotated `Set-Cookie`, if
/// `enforce_session` minted a new cookie value on this call. Every
/// `/v1/admin/*` handler routes its response through this so a 15-minute
/// rotation picked up mid-way through an unrelated call (e.g. `PUT
/// /v1/admin/secrets/:binding`) still reaches the client, not just
/// `GET /v1/admin/session/me`.
pub fn with_rotated_cookie(outcome: &SessionOutcome, body: serde_json::Value) -> Response {
    let json = Json(body);
    if outcome.cookie_changed {
        let cookie = session_set_cookie(&outcome.session_id, outcome.absolute_expiry_ms);
        ([("set-cookie", cookie)], json).into_response()
    } else {
        json.into_response()
    }
}

/// Build the `Set-Cookie` header value for a (re)issued session.
pub fn session_set_cookie(session_id: &str, absolute_expiry_ms: i64) -> String {
    let max_age = ((absolute_expiry_ms - now_unix_millis()) / 1000).max(0);
    format!(
        "{SESSION_COOKIE}={session_id}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age}"
    )
}

/// The header value that immediately expires the session cookie.
pub fn session_clear_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}

/// Pull the session cookie's value out of a `cookie` request header, if
/// present.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').filter_map(|pair| pair.trim().split_once('=')).find_map(|(name, value)| {
        (name == SESSION_COOKIE).then(|| value.to_owned())
    })
}

fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
