//! The egress proxy: the only component of the boundary that ever speaks
//! to a third-party upstream service.
//!
//! [`Proxy::handle`] implements §4.6 end to end — signed-request
//! verification, active+enabled action lookup, input schema validation,
//! body size and rate-limit enforcement, upstream request construction
//! through [`request::build`], the timeout-bounded outbound call, response
//! shaping, and `/secret/i` message redaction — emitting the
//! `{adapter, action, outcome, statusClass, denyReason, latencyMs}` metric
//! tuple on every exit path, success or failure.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod limiter;
mod metrics;
mod request;

pub use limiter::RateLimiter;
pub use metrics::{MetricsSink, Outcome, RequestMetric};

use std::time::{Duration, Instant};

use pincer_auth::{verify, RuntimeKeyRecord, SignedRequestHeaders};
use pincer_error::{ApiError, ErrorKind};
use pincer_registry::Registry;
use pincer_vault::Vault;

/// Everything needed to dispatch one `POST /v1/adapter/:adapter/:action`
/// call.
pub struct ProxyRequest<'a> {
    /// HTTP method of the inbound call (always `POST` on this route, but
    /// passed through so the canonical signing string is computed the
    /// same way [`pincer_auth::verify`] expects elsewhere).
    pub method: &'a str,
    /// The normalized request path, excluding query and fragment.
    pub path: &'a str,
    /// The adapter id from the route.
    pub adapter_id: &'a str,
    /// The action name from the route.
    pub action_name: &'a str,
    /// The raw, unparsed request body.
    pub raw_body: &'a [u8],
    /// The signed-request headers, for §4.1 verification.
    pub headers: SignedRequestHeaders<'a>,
}

/// A successful upstream response, shaped for the caller.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    /// Always 200 on this path (non-2xx upstream responses become an
    /// `ApiError` instead).
    pub status: u16,
    /// `{"ok": true, "adapter": ..., "action": ..., "data": ...}`.
    pub body: serde_json::Value,
}

/// The egress proxy, wired to the registry, vault, rate limiter, metrics
/// sink, and outbound HTTP client it needs.
pub struct Proxy<'a> {
    registry: &'a Registry<'a>,
    vault: &'a Vault<'a>,
    limiter: &'a RateLimiter,
    metrics: &'a MetricsSink,
    http: &'a reqwest::Client,
}

impl<'a> Proxy<'a> {
    /// Construct a proxy over its collaborators. None of these are owned;
    /// the binary crate holds the long-lived instances.
    pub fn new(
        registry: &'a Registry<'a>,
        vault: &'a Vault<'a>,
        limiter: &'a RateLimiter,
        metrics: &'a MetricsSink,
        http: &'a reqwest::Client,
    ) -> Self {
        Proxy { registry, vault, limiter, metrics, http }
    }

    /// Dispatch one runtime call, authenticating, validating, rate
    /// limiting, and forwarding it, recording a metric regardless of
    /// outcome.
    pub async fn handle(
        &self,
        runtime_key: Option<&RuntimeKeyRecord>,
        req: ProxyRequest<'_>,
    ) -> Result<ProxyResponse, ApiError> {
        let started = Instant::now();
        let result = self.handle_inner(runtime_key, &req).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let (status, outcome, deny_reason) = match &result {
            Ok(response) => (response.status, Outcome::Allowed, None),
            Err(err) => {
                let outcome = match err.kind {
                    ErrorKind::UpstreamError | ErrorKind::InternalError => Outcome::Error,
                    _ => Outcome::Denied,
                };
                (err.status, outcome, Some(err.kind.as_str()))
            }
        };
        self.metrics.record(RequestMetric {
            adapter: req.adapter_id.to_owned(),
            action: req.action_name.to_owned(),
            outcome,
            status_class: RequestMetric::status_class_for(status),
            deny_reason,
            latency_ms,
        });

        result
    }

    async fn handle_inner(
        &self,
        runtime_key: Option<&RuntimeKeyRecord>,
        req: &ProxyRequest<'_>,
    ) -> Result<ProxyResponse, ApiError> {
        let key_id = verify(runtime_key, self.vault, req.method, req.path, req.raw_body, req.headers)?;

        let (manifest, action) = self
            .registry
            .get_adapter_action(req.adapter_id, req.action_name)
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?
            .ok_or_else(|| ApiError::new(ErrorKind::ActionNotAllowed))?;

        let envelope: serde_json::Value =
            serde_json::from_slice(req.raw_body).map_err(|_| ApiError::new(ErrorKind::InvalidInputPayload))?;
        let input = envelope
            .as_object()
            .and_then(|o| o.get("input"))
            .filter(|v| v.is_object())
            .cloned()
            .ok_or_else(|| ApiError::new(ErrorKind::InvalidInputPayload))?;

        if let Err(errors) = pincer_manifest::validate_input(&action.input_schema, &input) {
            return Err(ApiError::new(ErrorKind::InvalidInput).with_details(errors));
        }

        let max_bytes = action.limits.max_body_kb as usize * 1024;
        if req.raw_body.len() > max_bytes {
            return Err(ApiError::new(ErrorKind::BodyTooLarge));
        }

        let now_ms = now_unix_millis();
        if !self.limiter.check_and_increment(
            &key_id,
            req.adapter_id,
            req.action_name,
            action.limits.rate_per_minute,
            now_ms,
        ) {
            return Err(ApiError::new(ErrorKind::RateLimited));
        }

        let secret = self
            .vault
            .resolve(&action.auth.secret_binding)
            .map_err(|_| ApiError::new(ErrorKind::MissingSecret))?;
        if secret.is_empty() {
            return Err(ApiError::new(ErrorKind::MissingSecret));
        }

        let upstream = request::build(&manifest, &action, &input, &secret)?;

        let method = match upstream.method {
            pincer_manifest::Method::Get => reqwest::Method::GET,
            pincer_manifest::Method::Post => reqwest::Method::POST,
        };
        let mut builder = self.http.request(method, upstream.url.clone());
        for (name, value) in &upstream.headers {
            builder = builder.header(name, value);
        }
        if let (Some(body), Some(content_type)) = (&upstream.body, upstream.content_type) {
            builder = builder.header("content-type", content_type).body(body.clone());
        }

        let timeout = Duration::from_millis(action.limits.timeout_ms as u64);
        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) | Err(_) => return Err(ApiError::new(ErrorKind::UpstreamError)),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::new(ErrorKind::UpstreamError).with_upstream_status(status.as_u16()));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let data = if is_json {
            response.json::<serde_json::Value>().await.map_err(|err| {
                ApiError::new(ErrorKind::InternalError)
                    .with_details(vec![ApiError::redact_message(&err.to_string()).into_owned()])
            })?
        } else {
            let text = response
                .text()
                .await
                .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
            serde_json::Value::String(text)
        };

        Ok(ProxyResponse {
            status: 200,
            body: serde_json::json!({
                "ok": true,
                "adapter": req.adapter_id,
                "action": req.action_name,
                "data": data,
            }),
        })
    }
}

fn now_unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_kv::FsKv;
    use pincer_registry::ApplyRequest;
    use serde_json::json;

    fn seed_manifest() -> serde_json::Value {
        json!({
            "id": "youtube",
            "revision": 1,
            "baseUrl": "https://youtube.googleapis.com",
            "allowedHosts": ["youtube.googleapis.com"],
            "requiredSecrets": ["YOUTUBE_API_KEY"],
            "actions": {
                "list_channel_videos": {
                    "method": "GET",
                    "path": "/youtube/v3/search",
                    "requestMode": "query",
                    "auth": {"placement": "query", "name": "key", "secretBinding": "YOUTUBE_API_KEY"},
                    "limits": {"maxBodyKb": 8, "timeoutMs": 1500, "ratePerMinute": 2},
                    "inputSchema": {
                        "properties": {"channelId": {"type": "string", "minLength": 1}},
                        "required": ["channelId"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }

    struct Harness {
        _dir: tempfile::TempDir,
        kv: FsKv,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let kv = FsKv::open(dir.path()).unwrap();
            Harness { _dir: dir, kv }
        }
    }

    #[tokio::test]
    async fn unknown_action_is_denied_without_touching_upstream() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        let registry = Registry::new(&h.kv, &vault);
        let limiter = RateLimiter::new();
        let metrics = MetricsSink::new();
        let http = reqwest::Client::new();
        let proxy = Proxy::new(&registry, &vault, &limiter, &metrics, &http);

        let record = RuntimeKeyRecord {
            id: "key_123".to_owned(),
            key_hash: pincer_crypto::sha256_hex(b"s3cr3t"),
            hmac_secret_binding: Some("HMAC_BINDING".to_owned()),
            key_secret_binding: Some("KEY_BINDING".to_owned()),
            skew_seconds: 60,
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
        };
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();

        let result = proxy
            .handle(
                Some(&record),
                ProxyRequest {
                    method: "POST",
                    path: "/v1/adapter/youtube/list_channel_videos",
                    adapter_id: "youtube",
                    action_name: "list_channel_videos",
                    raw_body: b"{}",
                    headers: SignedRequestHeaders::default(),
                },
            )
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidRuntimeKeyFormat);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].outcome, Outcome::Denied);
    }

    #[tokio::test]
    async fn active_disabled_adapter_is_not_allowed() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);
        registry.apply(ApplyRequest::Manifest(seed_manifest())).unwrap();
        registry.disable("youtube").unwrap();

        let limiter = RateLimiter::new();
        let metrics = MetricsSink::new();
        let http = reqwest::Client::new();
        let proxy = Proxy::new(&registry, &vault, &limiter, &metrics, &http);

        let record = RuntimeKeyRecord {
            id: "key_123".to_owned(),
            key_hash: pincer_crypto::sha256_hex(b"s3cr3t"),
            hmac_secret_binding: Some("HMAC_BINDING".to_owned()),
            key_secret_binding: Some("KEY_BINDING".to_owned()),
            skew_seconds: 60,
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
        };

        let body = b"{\"input\":{\"channelId\":\"abc\"}}";
        let body_hash = pincer_crypto::sha256_hex(body);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let canonical = pincer_auth::canonical_signing_string(
            "POST",
            "/v1/adapter/youtube/list_channel_videos",
            now,
            &body_hash,
        );
        let sig = pincer_crypto::hmac_sha256_hex(b"hmac-secret", canonical.as_bytes());
        let ts = now.to_string();
        let auth = "Bearer key_123.s3cr3t".to_owned();
        let sig_header = format!("v1={sig}");

        let result = proxy
            .handle(
                Some(&record),
                ProxyRequest {
                    method: "POST",
                    path: "/v1/adapter/youtube/list_channel_videos",
                    adapter_id: "youtube",
                    action_name: "list_channel_videos",
                    raw_body: body,
                    headers: SignedRequestHeaders {
                        authorization: Some(&auth),
                        timestamp: Some(&ts),
                        body_sha256: Some(&body_hash),
                        signature: Some(&sig_header),
                    },
                },
            )
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::ActionNotAllowed);
    }

    #[tokio::test]
    async fn rate_limit_denies_the_call_after_the_limit() {
        let h = Harness::new();
        let vault = Vault::new(&h.kv, b"kek");
        vault.put("YOUTUBE_API_KEY", "sk-abc", "admin").unwrap();
        vault.put("HMAC_BINDING", "hmac-secret", "admin").unwrap();
        let registry = Registry::new(&h.kv, &vault);
        registry.apply(ApplyRequest::Manifest(seed_manifest())).unwrap();

        let limiter = RateLimiter::new();
        let metrics = MetricsSink::new();
        let http = reqwest::Client::new();
        let proxy = Proxy::new(&registry, &vault, &limiter, &metrics, &http);

        let record = RuntimeKeyRecord {
            id: "key_123".to_owned(),
            key_hash: pincer_crypto::sha256_hex(b"s3cr3t"),
            hmac_secret_binding: Some("HMAC_BINDING".to_owned()),
            key_secret_binding: Some("KEY_BINDING".to_owned()),
            skew_seconds: 60,
            updated_at: "2026-01-01T00:00:00Z".to_owned(),
        };

        let make_request = || {
            let body = b"{\"input\":{\"channelId\":\"abc\"}}".to_vec();
            let body_hash = pincer_crypto::sha256_hex(&body);
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_secs() as i64;
            let canonical = pincer_auth::canonical_signing_string(
                "POST",
                "/v1/adapter/youtube/list_channel_videos",
                now,
                &body_hash,
            );
            let sig = pincer_crypto::hmac_sha256_hex(b"hmac-secret", canonical.as_bytes());
            (body, body_hash, now.to_string(), format!("v1={sig}"))
        };

        for _ in 0..2 {
            let (body, body_hash, ts, sig_header) = make_request();
            let result = proxy
                .handle(
                    Some(&record),
                    ProxyRequest {
                        method: "POST",
                        path: "/v1/adapter/youtube/list_channel_videos",
                        adapter_id: "youtube",
                        action_name: "list_channel_videos",
                        raw_body: &body,
                        headers: SignedRequestHeaders {
                            authorization: Some("Bearer key_123.s3cr3t"),
                            timestamp: Some(&ts),
                            body_sha256: Some(&body_hash),
                            signature: Some(&sig_header),
                        },
                    },
                )
                .await;
            // Both attempts reach the upstream call and fail with a
            // connection error against a host that doesn't exist in this
            // test environment; what matters here is that neither is
            // rejected as `rate_limited`.
            assert_ne!(result.unwrap_err().kind, ErrorKind::RateLimited);
        }

        let (body, body_hash, ts, sig_header) = make_request();
        let result = proxy
            .handle(
                Some(&record),
                ProxyRequest {
                    method: "POST",
                    path: "/v1/adapter/youtube/list_channel_videos",
                    adapter_id: "youtube",
                    action_name: "list_channel_videos",
                    raw_body: &body,
                    headers: SignedRequestHeaders {
                        authorization: Some("Bearer key_123.s3cr3t"),
                        timestamp: Some(&ts),
                        body_sha256: Some(&body_hash),
                        signature: Some(&sig_header),
                    },
                },
            )
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::RateLimited);
    }
}
