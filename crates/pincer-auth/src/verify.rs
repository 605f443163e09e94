//! The signed-request verifier: bearer key + timestamped HMAC with a
//! replay window, the gate every `/v1/adapter/*` and `/v1/adapters*` call
//! (other than `/v1/connect`) passes through.

use serde::{Deserialize, Serialize};

use pincer_crypto::{constant_time_eq, sha256_hex, verify_hmac_sha256_hex};
use pincer_error::{ApiError, ErrorKind};
use pincer_vault::Vault;

/// Fallback HMAC secret binding name, used when a runtime key record
/// predates the field that makes it explicit.
pub const DEFAULT_HMAC_SECRET_BINDING: &str = "PINCER_HMAC_SECRET_ACTIVE";
/// Fallback runtime key secret binding name, same rationale.
pub const DEFAULT_KEY_SECRET_BINDING: &str = "PINCER_RUNTIME_KEY_SECRET_ACTIVE";

fn default_skew_seconds() -> i64 {
    60
}

/// The one runtime key record a deployment holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeKeyRecord {
    /// Opaque key id presented in the `Bearer <id>.<secret>` header.
    pub id: String,
    /// Hex SHA-256 of the shared runtime secret.
    #[serde(rename = "keyHash")]
    pub key_hash: String,
    /// Vault binding holding the HMAC signing secret. Treat the record
    /// shape with both bindings present as authoritative; fall back to
    /// [`DEFAULT_HMAC_SECRET_BINDING`] when absent (an older record shape
    /// predates this field).
    #[serde(rename = "hmacSecretBinding", default)]
    pub hmac_secret_binding: Option<String>,
    /// Vault binding holding the runtime key secret itself.
    #[serde(rename = "keySecretBinding", default)]
    pub key_secret_binding: Option<String>,
    /// Allowed clock skew, in seconds, for the request timestamp.
    #[serde(rename = "skewSeconds", default = "default_skew_seconds")]
    pub skew_seconds: i64,
    /// RFC 3339 timestamp of the last rotation.
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl RuntimeKeyRecord {
    /// The binding name to resolve for the HMAC secret.
    pub fn hmac_binding(&self) -> &str {
        self.hmac_secret_binding.as_deref().unwrap_or(DEFAULT_HMAC_SECRET_BINDING)
    }

    /// The binding name to resolve for the runtime key secret.
    pub fn key_secret_binding_name(&self) -> &str {
        self.key_secret_binding.as_deref().unwrap_or(DEFAULT_KEY_SECRET_BINDING)
    }
}

/// The handful of request headers the verifier needs, transport-agnostic
/// so this crate never has to know about `axum`/`hyper` header maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedRequestHeaders<'a> {
    /// The `authorization` header value.
    pub authorization: Option<&'a str>,
    /// The `x-pincer-timestamp` header value.
    pub timestamp: Option<&'a str>,
    /// The `x-pincer-body-sha256` header value.
    pub body_sha256: Option<&'a str>,
    /// The `x-pincer-signature` header value.
    pub signature: Option<&'a str>,
}

/// Verify a signed runtime request, in the order the data model specifies.
///
/// `record` is `None` when no runtime key has been configured yet
/// (`missing_runtime_config`). On success, returns the authenticated
/// `keyId`.
pub fn verify(
    record: Option<&RuntimeKeyRecord>,
    vault: &Vault<'_>,
    method: &str,
    path: &str,
    body: &[u8],
    headers: SignedRequestHeaders<'_>,
) -> Result<String, ApiError> {
    let (key_id, key_secret) = headers
        .authorization
        .and_then(parse_bearer)
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidRuntimeKeyFormat))?;

    let record = record.ok_or_else(|| ApiError::new(ErrorKind::MissingRuntimeConfig))?;

    if key_id != record.id {
        return Err(ApiError::new(ErrorKind::UnknownRuntimeKey));
    }

    if !constant_time_eq(sha256_hex(key_secret.as_bytes()).as_bytes(), record.key_hash.as_bytes()) {
        return Err(ApiError::new(ErrorKind::InvalidRuntimeKey));
    }

    let hmac_secret = vault
        .resolve(record.hmac_binding())
        .map_err(|_| ApiError::new(ErrorKind::MissingHmacSecret))?;
    if hmac_secret.is_empty() {
        return Err(ApiError::new(ErrorKind::MissingHmacSecret));
    }

    let timestamp: i64 = headers
        .timestamp
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| ApiError::new(ErrorKind::InvalidTimestamp))?;
    let now = now_unix_seconds();
    if (now - timestamp).abs() > record.skew_seconds {
        return Err(ApiError::new(ErrorKind::StaleTimestamp));
    }

    let body_hash = sha256_hex(body);
    let presented_body_hash = headers.body_sha256.unwrap_or_default();
    if !constant_time_eq(body_hash.as_bytes(), presented_body_hash.as_bytes()) {
        return Err(ApiError::new(ErrorKind::InvalidBodyHash));
    }

    let canonical = canonical_signing_string(method, path, timestamp, &body_hash);
    let presented_signature = headers.signature.unwrap_or_default();
    if !verify_hmac_sha256_hex(hmac_secret.as_bytes(), canonical.as_bytes(), presented_signature) {
        return Err(ApiError::new(ErrorKind::InvalidSignature));
    }

    Ok(record.id.clone())
}

/// `"<METHOD>\n<path>\n<timestamp>\n<bodySha256hex>"`.
pub fn canonical_signing_string(method: &str, path: &str, timestamp: i64, body_sha256_hex: &str) -> String {
    format!("{}\n{path}\n{timestamp}\n{body_sha256_hex}", method.to_ascii_uppercase())
}

fn parse_bearer(header: &str) -> Option<(String, String)> {
    let rest = header.strip_prefix("Bearer ")?;
    let (key_id, key_secret) = rest.split_once('.')?;
    if key_id.is_empty() || key_secret.is_empty() {
        return None;
    }
    Some((key_id.to_owned(), key_secret.to_owned()))
}

fn now_unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_kv::FsKv;

    fn record(skew: i64) -> RuntimeKeyRecord {
        RuntimeKeyRecord {
            id: "key_123".to_owned(),
            key_hash: sha256_hex(b"s3cr3t"),
            hmac_secret_binding: Some("HMAC_BINDING".to_owned()),
            key_secret_binding: Some("KEY_BINDING".to_owned()),
            skew_seconds: skew,
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
        }
    }

    fn signed_headers<'a>(
        record: &RuntimeKeyRecord,
        hmac_secret: &str,
        method: &str,
        path: &str,
        body: &'a [u8],
        timestamp: i64,
    ) -> (String, String, String, String) {
        let body_hash = sha256_hex(body);
        let canonical = canonical_signing_string(method, path, timestamp, &body_hash);
        let signature = format!("v1={}", pincer_crypto::hmac_sha256_hex(hmac_secret.as_bytes(), canonical.as_bytes()));
        (
            format!("Bearer {}.s3cr3t", record.id),
            timestamp.to_string(),
            body_hash,
            signature,
        )
    }

    #[test]
    fn accepts_a_correctly_signed_request() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        let vault = Vault::new(&kv, b"kek");
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();

        let record = record(60);
        let now = now_unix_seconds();
        let (auth, ts, body_hash, sig) = signed_headers(&record, "hmac-secret", "POST", "/v1/adapter/youtube/list", b"{}", now);

        let outcome = verify(
            Some(&record),
            &vault,
            "POST",
            "/v1/adapter/youtube/list",
            b"{}",
            SignedRequestHeaders {
                authorization: Some(&auth),
                timestamp: Some(&ts),
                body_sha256: Some(&body_hash),
                signature: Some(&sig),
            },
        );
        assert_eq!(outcome.unwrap(), "key_123");
    }

    #[test]
    fn rejects_stale_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        let vault = Vault::new(&kv, b"kek");
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();

        let record = record(60);
        let stale = now_unix_seconds() - 120;
        let (auth, ts, body_hash, sig) = signed_headers(&record, "hmac-secret", "GET", "/v1/adapters", b"", stale);

        let outcome = verify(
            Some(&record),
            &vault,
            "GET",
            "/v1/adapters",
            b"",
            SignedRequestHeaders {
                authorization: Some(&auth),
                timestamp: Some(&ts),
                body_sha256: Some(&body_hash),
                signature: Some(&sig),
            },
        );
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::StaleTimestamp);
    }

    #[test]
    fn rejects_tampered_signature() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        let vault = Vault::new(&kv, b"kek");
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();

        let record = record(60);
        let now = now_unix_seconds();
        let (auth, ts, body_hash, _sig) = signed_headers(&record, "hmac-secret", "GET", "/v1/adapters", b"", now);

        let outcome = verify(
            Some(&record),
            &vault,
            "GET",
            "/v1/adapters",
            b"",
            SignedRequestHeaders {
                authorization: Some(&auth),
                timestamp: Some(&ts),
                body_sha256: Some(&body_hash),
                signature: Some("v1=deadbeef"),
            },
        );
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::InvalidSignature);
    }

    #[test]
    fn rejects_malformed_authorization_header() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        let vault = Vault::new(&kv, b"kek");
        let record = record(60);

        let outcome = verify(
            Some(&record),
            &vault,
            "GET",
            "/v1/adapters",
            b"",
            SignedRequestHeaders { authorization: Some("Bearer garbage"), ..Default::default() },
        );
        assert_eq!(outcome.unwrap_err().kind, ErrorKind::InvalidRuntimeKeyFormat);
    }

    #[test]
    fn accepts_timestamp_at_exactly_the_skew_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        let vault = Vault::new(&kv, b"kek");
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();

        let record = record(60);
        let boundary = now_unix_seconds() - 60;
        let (auth, ts, body_hash, sig) = signed_headers(&record, "hmac-secret", "GET", "/v1/adapters", b"", boundary);

        let outcome = verify(
            Some(&record),
            &vault,
            "GET",
            "/v1/adapters",
            b"",
            SignedRequestHeaders {
                authorization: Some(&auth),
                timestamp: Some(&ts),
                body_sha256: Some(&body_hash),
                signature: Some(&sig),
            },
        );
        assert!(outcome.is_ok());
    }
}
