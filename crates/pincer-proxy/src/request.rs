//! Pure upstream-request construction: turn a validated manifest, action,
//! and caller `input` into the concrete URL/headers/body an HTTP client
//! will send, without doing any I/O.
//!
//! Kept separate from [`crate::Proxy::handle`] so the request-building
//! rules (auth placement, request mode, the post-interpolation host
//! re-check) are unit-testable without a mock HTTP server.

use pincer_error::{ApiError, ErrorKind};
use pincer_manifest::{Action, AuthPlacement, Manifest, RequestMode};
use url::Url;

/// Everything needed to issue the upstream call.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    /// `GET` or `POST`.
    pub method: pincer_manifest::Method,
    /// The fully resolved upstream URL, including any query-placed auth.
    pub url: Url,
    /// Extra headers to attach (may include the resolved secret).
    pub headers: Vec<(String, String)>,
    /// The request body, already serialized, when `requestMode = json`.
    pub body: Option<Vec<u8>>,
    /// The `content-type` to send alongside `body`, if any.
    pub content_type: Option<&'static str>,
}

/// Build the upstream request for `action`, attaching `secret` per its
/// `auth` placement and re-checking the resolved URL against the
/// manifest's host allow-list.
pub fn build(
    manifest: &Manifest,
    action: &Action,
    input: &serde_json::Value,
    secret: &str,
) -> Result<UpstreamRequest, ApiError> {
    let base = Url::parse(&manifest.base_url).map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    let mut url = base.join(&action.path).map_err(|_| ApiError::new(ErrorKind::InternalError))?;

    let mut headers = Vec::new();
    let auth_value = match &action.auth.prefix {
        Some(prefix) => format!("{prefix}{secret}"),
        None => secret.to_owned(),
    };
    match action.auth.placement {
        AuthPlacement::Header => headers.push((action.auth.name.clone(), auth_value)),
        AuthPlacement::Query => {
            url.query_pairs_mut().append_pair(&action.auth.name, &auth_value);
        }
    }

    let (body, content_type) = match action.request_mode {
        RequestMode::Json => {
            let payload = if input.is_null() { serde_json::json!({}) } else { input.clone() };
            let bytes = serde_json::to_vec(&payload).map_err(|_| ApiError::new(ErrorKind::InternalError))?;
            (Some(bytes), Some("application/json"))
        }
        RequestMode::Query => {
            if let Some(object) = input.as_object() {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in object {
                    if value.is_null() {
                        continue;
                    }
                    pairs.append_pair(key, &stringify_query_value(value));
                }
            }
            (None, None)
        }
    };

    if url.scheme() != "https" || !manifest.allowed_hosts.contains(&host_with_port(&url)) {
        return Err(ApiError::new(ErrorKind::HostNotAllowed));
    }

    Ok(UpstreamRequest { method: action.method, url, headers, body, content_type })
}

fn stringify_query_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}
