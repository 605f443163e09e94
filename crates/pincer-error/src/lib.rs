//! Shared error kinds for the Pincer egress boundary.
//!
//! Every fallible boundary operation resolves to one of the stable string
//! `kind`s enumerated in [`ErrorKind`] before it leaves the process. Each
//! component (`pincer-auth`, `pincer-registry`, `pincer-proxy`, ...) keeps
//! its own `thiserror` error type for internal propagation; [`ApiError`] is
//! the single place those get funneled into the machine-readable shape a
//! caller sees on the wire.

#![warn(missing_docs)]
#![deny(unreachable_pub)]

use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// A stable, machine-readable error identifier returned in the `error`
/// field of every non-2xx JSON response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    // --- input / validation ---
    /// The request body could not be parsed as the expected shape.
    InvalidPayload,
    /// A submitted or applied manifest failed validation.
    InvalidManifest,
    /// An action's `input` object failed schema validation.
    InvalidInput,
    /// The proxy request body was not `{"input": {...}}`.
    InvalidInputPayload,
    /// A rejection reason was malformed (too long, etc).
    InvalidReason,
    /// An audit `limit` query parameter was out of range.
    InvalidLimit,
    /// An audit `since` query parameter was malformed.
    InvalidSince,
    /// A vault `PUT` carried an empty or otherwise invalid secret value.
    InvalidSecretValue,
    /// A bootstrap username failed validation.
    InvalidUsername,
    /// A bootstrap or login password failed validation.
    InvalidPassword,

    // --- auth ---
    /// The `authorization` header was not `Bearer <keyId>.<keySecret>`.
    InvalidRuntimeKeyFormat,
    /// The presented `keyId` does not match the configured runtime key.
    UnknownRuntimeKey,
    /// The presented `keySecret` does not hash to the configured value.
    InvalidRuntimeKey,
    /// No runtime key record has been configured yet.
    MissingRuntimeConfig,
    /// The HMAC secret binding did not resolve to a value.
    MissingHmacSecret,
    /// The request timestamp was not a valid integer.
    InvalidTimestamp,
    /// The request timestamp fell outside the configured skew window.
    StaleTimestamp,
    /// The presented body hash did not match the recomputed one.
    InvalidBodyHash,
    /// The presented HMAC signature did not match the recomputed one.
    InvalidSignature,
    /// A required secret binding resolved to nothing.
    MissingSecret,
    /// No admin session cookie was presented.
    MissingAdminSession,
    /// The admin session cookie did not refer to a live session.
    InvalidAdminSession,
    /// The admin session has passed its absolute or idle expiry.
    ExpiredAdminSession,
    /// The `x-pincer-csrf` header did not match the session's CSRF token.
    InvalidCsrfToken,
    /// The bootstrap token did not match the configured value.
    InvalidBootstrapToken,
    /// The login username/password pair did not verify.
    InvalidCredentials,
    /// The client is locked out of login attempts.
    LoginLocked,
    /// An admin user already exists; bootstrap cannot run again.
    AdminAlreadyInitialized,
    /// A pairing code was absent, already consumed, or past its TTL.
    InvalidOrExpiredCode,

    // --- registry ---
    /// No proposal exists with the given id.
    ProposalNotFound,
    /// No active adapter exists with the given id.
    AdapterNotFound,
    /// An apply targeted a revision older than the active one.
    RevisionOutdated,
    /// An apply targeted the active revision but its content differs.
    RevisionConflict,
    /// One or more of a manifest's required secrets are unresolved.
    MissingRequiredSecrets,

    // --- proxy / runtime ---
    /// The requested adapter/action is unknown or disabled.
    ActionNotAllowed,
    /// The request body exceeded the action's configured limit.
    BodyTooLarge,
    /// The per-action rate limit has been exceeded for this minute bucket.
    RateLimited,
    /// The interpolated upstream host is not in the manifest's allow-list.
    HostNotAllowed,
    /// The upstream service responded with a non-2xx status.
    UpstreamError,

    // --- infrastructure ---
    /// The KV namespace could not be opened.
    MissingKvBinding,
    /// A pairing record failed to deserialize.
    CorruptPairingRecord,
    /// An unexpected internal failure occurred.
    InternalError,
}

impl ErrorKind {
    /// The stable wire string for this error kind.
    pub fn as_str(self) -> &'static str {
        use ErrorKind::*;
        match self {
            InvalidPayload => "invalid_payload",
            InvalidManifest => "invalid_manifest",
            InvalidInput => "invalid_input",
            InvalidInputPayload => "invalid_input_payload",
            InvalidReason => "invalid_reason",
            InvalidLimit => "invalid_limit",
            InvalidSince => "invalid_since",
            InvalidSecretValue => "invalid_secret_value",
            InvalidUsername => "invalid_username",
            InvalidPassword => "invalid_password",
            InvalidRuntimeKeyFormat => "invalid_runtime_key_format",
            UnknownRuntimeKey => "unknown_runtime_key",
            InvalidRuntimeKey => "invalid_runtime_key",
            MissingRuntimeConfig => "missing_runtime_config",
            MissingHmacSecret => "missing_hmac_secret",
            InvalidTimestamp => "invalid_timestamp",
            StaleTimestamp => "stale_timestamp",
            InvalidBodyHash => "invalid_body_hash",
            InvalidSignature => "invalid_signature",
            MissingSecret => "missing_secret",
            MissingAdminSession => "missing_admin_session",
            InvalidAdminSession => "invalid_admin_session",
            ExpiredAdminSession => "expired_admin_session",
            InvalidCsrfToken => "invalid_csrf_token",
            InvalidBootstrapToken => "invalid_bootstrap_token",
            InvalidCredentials => "invalid_credentials",
            LoginLocked => "login_locked",
            AdminAlreadyInitialized => "admin_already_initialized",
            InvalidOrExpiredCode => "invalid_or_expired_code",
            ProposalNotFound => "proposal_not_found",
            AdapterNotFound => "adapter_not_found",
            RevisionOutdated => "revision_outdated",
            RevisionConflict => "revision_conflict",
            MissingRequiredSecrets => "missing_required_secrets",
            ActionNotAllowed => "action_not_allowed",
            BodyTooLarge => "body_too_large",
            RateLimited => "rate_limited",
            HostNotAllowed => "host_not_allowed",
            UpstreamError => "upstream_error",
            MissingKvBinding => "missing_kv_binding",
            CorruptPairingRecord => "corrupt_pairing_record",
            InternalError => "internal_error",
        }
    }

    /// The default HTTP status code for this error kind.
    ///
    /// Call sites may still override this (e.g. `login_locked` always
    /// carries a `Retry-After`, but the status itself, 429, is fixed here).
    pub fn default_status(self) -> u16 {
        use ErrorKind::*;
        match self {
            InvalidPayload | InvalidManifest | InvalidInput | InvalidInputPayload
            | InvalidReason | InvalidLimit | InvalidSince | InvalidSecretValue
            | InvalidUsername | InvalidPassword | MissingRequiredSecrets => 400,
            InvalidRuntimeKeyFormat | UnknownRuntimeKey | InvalidRuntimeKey | InvalidTimestamp
            | StaleTimestamp | InvalidBodyHash | InvalidSignature | MissingAdminSession
            | InvalidAdminSession | ExpiredAdminSession | InvalidBootstrapToken
            | InvalidCredentials => 401,
            InvalidCsrfToken => 403,
            ActionNotAllowed => 403,
            HostNotAllowed => 403,
            ProposalNotFound | AdapterNotFound | InvalidOrExpiredCode => 404,
            RevisionOutdated | RevisionConflict | AdminAlreadyInitialized => 409,
            BodyTooLarge => 413,
            RateLimited | LoginLocked => 429,
            UpstreamError => 502,
            MissingRuntimeConfig | MissingHmacSecret | MissingSecret | MissingKvBinding
            | CorruptPairingRecord | InternalError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The JSON body of an error response.
///
/// Serializes as `{"ok": false, "error": "<kind>", ...}` with whichever
/// extra fields (`details`, `missingSecrets`, `upstreamStatus`) are present
/// for that error kind.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// The stable error kind.
    pub kind: ErrorKind,
    /// The HTTP status to answer with. Usually `kind.default_status()`.
    pub status: u16,
    /// Free-form validation details (manifest/input validation failures).
    pub details: Vec<String>,
    /// Required secret bindings that failed to resolve.
    pub missing_secrets: Vec<String>,
    /// Seconds the caller should wait before retrying (`login_locked`).
    pub retry_after: Option<u64>,
    /// The upstream HTTP status that produced an `upstream_error`.
    pub upstream_status: Option<u16>,
}

impl ApiError {
    /// Construct a bare error with no extra detail, using the kind's
    /// default status.
    pub fn new(kind: ErrorKind) -> Self {
        ApiError {
            status: kind.default_status(),
            kind,
            details: Vec::new(),
            missing_secrets: Vec::new(),
            retry_after: None,
            upstream_status: None,
        }
    }

    /// Override the HTTP status (rarely needed; most kinds imply a fixed
    /// status, but `login_locked` and infra failures can want latitude).
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Attach free-form validation details.
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    /// Attach the list of secret bindings that failed to resolve.
    pub fn with_missing_secrets(mut self, missing: Vec<String>) -> Self {
        self.missing_secrets = missing;
        self
    }

    /// Attach a `Retry-After` value, in seconds.
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Attach the upstream status code for an `upstream_error`.
    pub fn with_upstream_status(mut self, status: u16) -> Self {
        self.upstream_status = Some(status);
        self
    }

    /// Sanitize any substring that looks like it names a secret.
    ///
    /// Infrastructure failures may otherwise leak a binding name or partial
    /// value in a free-text message; this is the last line of defense
    /// before such a message leaves the boundary.
    pub fn redact_message(message: &str) -> Cow<'_, str> {
        redact_secret_mentions(message)
    }
}

impl From<ErrorKind> for ApiError {
    fn from(kind: ErrorKind) -> Self {
        ApiError::new(kind)
    }
}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut fields = 2;
        if !self.details.is_empty() {
            fields += 1;
        }
        if !self.missing_secrets.is_empty() {
            fields += 1;
        }
        if self.retry_after.is_some() {
            fields += 1;
        }
        if self.upstream_status.is_some() {
            fields += 1;
        }
        let mut map = serializer.serialize_map(Some(fields))?;
        map.serialize_entry("ok", &false)?;
        map.serialize_entry("error", self.kind.as_str())?;
        if !self.details.is_empty() {
            map.serialize_entry("details", &self.details)?;
        }
        if !self.missing_secrets.is_empty() {
            map.serialize_entry("missingSecrets", &self.missing_secrets)?;
        }
        if let Some(retry) = self.retry_after {
            map.serialize_entry("retryAfter", &retry)?;
        }
        if let Some(status) = self.upstream_status {
            map.serialize_entry("upstreamStatus", &status)?;
        }
        map.end()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.status)
    }
}

impl std::error::Error for ApiError {}

/// Replace any substring matching `/secret/i` with `[redacted]`.
///
/// Used on infrastructure error messages before they leave the boundary
/// (see the Error Handling Design's propagation rule). This is a plain
/// case-insensitive substring scan, not a regex engine, since the pattern
/// is fixed and known at compile time.
fn redact_secret_mentions(message: &str) -> Cow<'_, str> {
    let lower = message.to_ascii_lowercase();
    let needle = "secret";
    if !lower.contains(needle) {
        return Cow::Borrowed(message);
    }

    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    let mut rest_lower = lower.as_str();
    loop {
        match rest_lower.find(needle) {
            Some(idx) => {
                out.push_str(&rest[..idx]);
                out.push_str("[redacted]");
                rest = &rest[idx + needle.len()..];
                rest_lower = &rest_lower[idx + needle.len()..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_strings_round_trip_status() {
        assert_eq!(ErrorKind::StaleTimestamp.as_str(), "stale_timestamp");
        assert_eq!(ErrorKind::StaleTimestamp.default_status(), 401);
        assert_eq!(ErrorKind::RateLimited.default_status(), 429);
        assert_eq!(ErrorKind::UpstreamError.default_status(), 502);
    }

    #[test]
    fn serializes_minimal_shape() {
        let err = ApiError::new(ErrorKind::ProposalNotFound);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "proposal_not_found");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn serializes_missing_secrets() {
        let err = ApiError::new(ErrorKind::MissingRequiredSecrets)
            .with_missing_secrets(vec!["YOUTUBE_API_KEY".into()]);
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["missingSecrets"][0], "YOUTUBE_API_KEY");
    }

    #[test]
    fn redacts_case_insensitively() {
        let msg = "could not resolve SECRET binding for Secret 'x'";
        let redacted = redact_secret_mentions(msg);
        assert_eq!(redacted, "could not resolve [redacted] binding for [redacted] 'x'");
    }

    #[test]
    fn leaves_unrelated_messages_untouched() {
        let msg = "disk is full";
        assert_eq!(redact_secret_mentions(msg), Cow::Borrowed(msg));
    }
}
