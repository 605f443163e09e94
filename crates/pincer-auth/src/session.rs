//! The admin session store: bootstrap, PBKDF2 login, cookie + CSRF
//! sessions, per-client lockout, and 15-minute session rotation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pincer_crypto::{constant_time_eq, hash_password, random_hex, verify_password};
use pincer_error::{ApiError, ErrorKind};
use pincer_kv::{KvStore, KvStoreExt};

const ADMIN_USER_KEY: &str = "admin:user";
const LOGIN_STATE_PREFIX: &str = "admin:login:";
const SESSION_PREFIX: &str = "admin:session:";

const ABSOLUTE_TTL_SECONDS: i64 = 8 * 60 * 60;
const IDLE_TTL_SECONDS: i64 = 30 * 60;
const ROTATION_INTERVAL_SECONDS: i64 = 15 * 60;
const LOCKOUT_THRESHOLD: u32 = 5;
const MAX_LOCK_SECONDS: i64 = 15 * 60;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{3,64}$").expect("static regex is valid"));

/// The singleton admin user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdminUser {
    username: String,
    #[serde(rename = "passwordSalt")]
    password_salt: String,
    #[serde(rename = "passwordHash")]
    password_hash: String,
    iterations: u32,
}

/// Per-`(username, clientId)` login attempt state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoginState {
    #[serde(rename = "failedCount")]
    failed_count: u32,
    #[serde(rename = "lockUntilMs")]
    lock_until_ms: i64,
    #[serde(rename = "updatedAt")]
    updated_at: String,
}

/// A live admin session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(rename = "sessionId")]
    session_id: String,
    username: String,
    #[serde(rename = "csrfToken")]
    csrf_token: String,
    #[serde(rename = "createdAt")]
    created_at_ms: i64,
    #[serde(rename = "rotatedAt")]
    rotated_at_ms: i64,
    #[serde(rename = "lastSeen")]
    last_seen_ms: i64,
    #[serde(rename = "absoluteExpiry")]
    absolute_expiry_ms: i64,
    #[serde(rename = "idleExpiry")]
    idle_expiry_ms: i64,
}

/// The outcome of a successful login or session enforcement pass: the
/// caller needs both the session state and the `Set-Cookie` value, since
/// this crate never touches `axum`/cookie-jar types directly.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// The authenticated username.
    pub username: String,
    /// Opaque session id to set as the `pincer_session` cookie value.
    pub session_id: String,
    /// The session's current CSRF token.
    pub csrf_token: String,
    /// Epoch milliseconds the session expires outright.
    pub absolute_expiry_ms: i64,
    /// Epoch milliseconds the session expires if unused.
    pub idle_expiry_ms: i64,
    /// `true` if this call minted a brand new cookie value the caller must
    /// `Set-Cookie` (login, or a 15-minute rotation); `false` if only
    /// `lastSeen`/`idleExpiry` were refreshed in place.
    pub cookie_changed: bool,
}

fn user_key() -> &'static str {
    ADMIN_USER_KEY
}

fn login_state_key(username: &str, client_id: &str) -> String {
    format!("{LOGIN_STATE_PREFIX}{username}:{client_id}")
}

fn session_key(session_id: &str) -> String {
    format!("{SESSION_PREFIX}{session_id}")
}

/// Extract the lockout-keying client id: `cf-connecting-ip`, or
/// `"unknown"`. Deliberately coarse — see the crate-level caveat about
/// rewriting this without a threat-model review.
pub fn client_id(cf_connecting_ip: Option<&str>) -> String {
    cf_connecting_ip.filter(|v| !v.is_empty()).unwrap_or("unknown").to_owned()
}

/// Whether an admin user has been bootstrapped yet.
pub fn needs_bootstrap(store: &dyn KvStore) -> Result<bool, ApiError> {
    let user: Option<serde_json::Value> = store
        .get_json(user_key())
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    Ok(user.is_none())
}

/// Bootstrap the singleton admin user.
pub fn bootstrap(
    store: &dyn KvStore,
    configured_token: &str,
    presented_token: &str,
    username: &str,
    password: &str,
) -> Result<String, ApiError> {
    if !needs_bootstrap(store)? {
        return Err(ApiError::new(ErrorKind::AdminAlreadyInitialized));
    }
    if !constant_time_eq(presented_token.as_bytes(), configured_token.as_bytes()) {
        return Err(ApiError::new(ErrorKind::InvalidBootstrapToken));
    }
    let username = username.to_ascii_lowercase();
    if !USERNAME_RE.is_match(&username) {
        return Err(ApiError::new(ErrorKind::InvalidUsername));
    }
    if password.len() < 12 {
        return Err(ApiError::new(ErrorKind::InvalidPassword));
    }

    let (salt, hash) = hash_password(password);
    let user = AdminUser {
        username: username.clone(),
        password_salt: salt,
        password_hash: hash,
        iterations: pincer_crypto::PBKDF2_ITERATIONS,
    };
    store
        .put_json(user_key(), &user)
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    tracing::info!(%username, "admin user bootstrapped");
    Ok(username)
}

/// Authenticate `(username, password)`, enforcing per-client lockout, and
/// mint a new session on success.
pub fn login(
    store: &dyn KvStore,
    username: &str,
    password: &str,
    client_id: &str,
) -> Result<SessionOutcome, ApiError> {
    let username = username.to_ascii_lowercase();
    let now_ms = now_unix_millis();
    let state_key = login_state_key(&username, client_id);
    let mut state: LoginState = store
        .get_json(&state_key)
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?
        .unwrap_or_default();

    if state.lock_until_ms > now_ms {
        let retry_after = ((state.lock_until_ms - now_ms) / 1000).max(1) as u64;
        return Err(ApiError::new(ErrorKind::LoginLocked).with_retry_after(retry_after));
    }

    let user: Option<AdminUser> = store
        .get_json(user_key())
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    let verified = user.as_ref().is_some_and(|user| {
        constant_time_eq(user.username.as_bytes(), username.as_bytes())
            && verify_password(password, &user.password_salt, &user.password_hash, user.iterations)
    });

    if !verified {
        state.failed_count += 1;
        if state.failed_count >= LOCKOUT_THRESHOLD {
            let lock_seconds = lock_duration_seconds(state.failed_count);
            state.lock_until_ms = now_ms + lock_seconds * 1000;
        }
        state.updated_at = now_rfc3339();
        store
            .put_json(&state_key, &state)
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?;

        if state.lock_until_ms > now_ms {
            let retry_after = ((state.lock_until_ms - now_ms) / 1000).max(1) as u64;
            return Err(ApiError::new(ErrorKind::LoginLocked).with_retry_after(retry_after));
        }
        return Err(ApiError::new(ErrorKind::InvalidCredentials));
    }

    store
        .delete(&state_key)
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;

    let record = mint_session(&username, now_ms);
    store
        .put_json(&session_key(&record.session_id), &record)
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    tracing::info!(%username, "admin session created");

    Ok(SessionOutcome {
        username: record.username,
        session_id: record.session_id,
        csrf_token: record.csrf_token,
        absolute_expiry_ms: record.absolute_expiry_ms,
        idle_expiry_ms: record.idle_expiry_ms,
        cookie_changed: true,
    })
}

fn lock_duration_seconds(failed_count: u32) -> i64 {
    let n = (failed_count - LOCKOUT_THRESHOLD) as u32;
    let scaled = 30i64.saturating_mul(1i64.checked_shl(n).unwrap_or(i64::MAX));
    scaled.min(MAX_LOCK_SECONDS)
}

fn mint_session(username: &str, now_ms: i64) -> SessionRecord {
    SessionRecord {
        session_id: random_hex(24),
        username: username.to_owned(),
        csrf_token: random_hex(24),
        created_at_ms: now_ms,
        rotated_at_ms: now_ms,
        last_seen_ms: now_ms,
        absolute_expiry_ms: now_ms + ABSOLUTE_TTL_SECONDS * 1000,
        idle_expiry_ms: now_ms + IDLE_TTL_SECONDS * 1000,
    }
}

/// Enforce an existing session: validate expiry, optionally require CSRF,
/// and rotate if the 15-minute interval has elapsed.
pub fn enforce(
    store: &dyn KvStore,
    presented_session_id: Option<&str>,
    presented_csrf: Option<&str>,
    require_csrf: bool,
) -> Result<SessionOutcome, ApiError> {
    let session_id = presented_session_id.ok_or_else(|| ApiError::new(ErrorKind::MissingAdminSession))?;
    let mut record: SessionRecord = store
        .get_json(&session_key(session_id))
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidAdminSession))?;

    let now_ms = now_unix_millis();
    if now_ms > record.absolute_expiry_ms || now_ms > record.idle_expiry_ms {
        let _ = store.delete(&session_key(session_id));
        return Err(ApiError::new(ErrorKind::ExpiredAdminSession));
    }

    if require_csrf {
        let presented = presented_csrf.unwrap_or_default();
        if !constant_time_eq(presented.as_bytes(), record.csrf_token.as_bytes()) {
            return Err(ApiError::new(ErrorKind::InvalidCsrfToken));
        }
    }

    let rotate = now_ms - record.rotated_at_ms >= ROTATION_INTERVAL_SECONDS * 1000;
    if rotate {
        store
            .delete(&session_key(session_id))
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
        record.session_id = random_hex(24);
        record.csrf_token = random_hex(24);
        record.rotated_at_ms = now_ms;
        record.last_seen_ms = now_ms;
        record.idle_expiry_ms = now_ms + IDLE_TTL_SECONDS * 1000;
        store
            .put_json(&session_key(&record.session_id), &record)
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    } else {
        record.last_seen_ms = now_ms;
        record.idle_expiry_ms = now_ms + IDLE_TTL_SECONDS * 1000;
        store
            .put_json(&session_key(&record.session_id), &record)
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    }

    Ok(SessionOutcome {
        username: record.username,
        session_id: record.session_id,
        csrf_token: record.csrf_token,
        absolute_expiry_ms: record.absolute_expiry_ms,
        idle_expiry_ms: record.idle_expiry_ms,
        cookie_changed: rotate,
    })
}

/// Delete a session by id. Idempotent.
pub fn logout(store: &dyn KvStore, session_id: &str) -> Result<(), ApiError> {
    store
        .delete(&session_key(session_id))
        .map_err(|_| ApiError::new(ErrorKind::InternalError))
}

fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
