//! Manifest validation: the pure function used by proposal submission,
//! apply, and any future CLI pre-flight check.
//!
//! Validation has two phases. First the raw JSON is deserialized into
//! [`Manifest`] at all — a structural failure (wrong type, missing field,
//! unknown enum tag) short-circuits with a single explanatory error.
//! Second, every constraint from the data model that serde's type system
//! cannot express (regex-shaped ids, HTTPS-only URLs, host allow-list
//! consistency, cross-references between `auth.secretBinding` and
//! `requiredSecrets`) is checked, accumulating every violation found rather
//! than stopping at the first one, so a caller sees the whole list of what
//! to fix in one round trip.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::types::Manifest;

static ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{1,63}$").expect("static regex is valid"));
static SECRET_BINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]{1,127}$").expect("static regex is valid"));
static ACTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_!_]{1,63}$").expect("static regex is valid"));

/// Validate `raw` against every constraint in the data model.
///
/// Returns the parsed, validated [`Manifest`] on success, or the full list
/// of violations found on failure.
pub fn validate(raw: &serde_json::Value) -> Result<Manifest, Vec<String>> {
    let manifest: Manifest = serde_json::from_value(raw.clone())
        .map_err(|err| vec![format!("manifest is not well-formed: {err}")])?;

    let mut errors = Vec::new();
    check_manifest(&manifest, &mut errors);

    if errors.is_empty() {
        Ok(manifest)
    } else {
        Err(errors)
    }
}

fn check_manifest(manifest: &Manifest, errors: &mut Vec<String>) {
    if !ID_RE.is_match(&manifest.id) {
        errors.push(format!("id {:?} does not match ^[a-z0-9][a-z0-9_-]{{1,63}}$", manifest.id));
    }
    if manifest.revision == 0 {
        errors.push("revision must be a positive integer".to_owned());
    }

    let base_url = match Url::parse(&manifest.base_url) {
        Ok(url) if url.scheme() == "https" => Some(url),
        Ok(_) => {
            errors.push(format!("baseUrl {:?} must use https", manifest.base_url));
            None
        }
        Err(err) => {
            errors.push(format!("baseUrl {:?} is not a valid URL: {err}", manifest.base_url));
            None
        }
    };

    for host in &manifest.allowed_hosts {
        if host.contains('*') {
            errors.push(format!("allowedHosts entry {host:?} must not contain a wildcard"));
        }
        if host.to_lowercase() != *host {
            errors.push(format!("allowedHosts entry {host:?} must be lowercase"));
        }
    }

    if let Some(base) = &base_url {
        let base_host = host_with_port(base);
        if !manifest.allowed_hosts.contains(&base_host) {
            errors.push(format!(
                "allowedHosts must include baseUrl's host {base_host:?}"
            ));
        }
    }

    for binding in &manifest.required_secrets {
        if !SECRET_BINDING_RE.is_match(binding) {
            errors.push(format!(
                "requiredSecrets entry {binding:?} does not match ^[A-Z][A-Z0-9_]{{1,127}}$"
            ));
        }
    }

    if manifest.actions.is_empty() {
        errors.push("actions must declare at least one action".to_owned());
    }

    for (name, action) in &manifest.actions {
        if !ACTION_NAME_RE.is_match(name) {
            errors.push(format!(
                "action name {name:?} does not match ^[a-z0-9][a-z0-9_!_]{{1,63}}$"
            ));
        }
        check_action(name, action, manifest, base_url.as_ref(), errors);
    }
}

fn check_action(
    name: &str,
    action: &crate::types::Action,
    manifest: &Manifest,
    base_url: Option<&Url>,
    errors: &mut Vec<String>,
) {
    if !action.path.starts_with('/') {
        errors.push(format!("actions.{name}.path must be an absolute path"));
    }

    if let Some(base) = base_url {
        match base.join(&action.path) {
            Ok(resolved) => {
                if resolved.scheme() != "https" {
                    errors.push(format!("actions.{name}.path must resolve to an https URL"));
                }
                let resolved_host = host_with_port(&resolved);
                if !manifest.allowed_hosts.contains(&resolved_host) {
                    errors.push(format!(
                        "actions.{name}.path resolves to host {resolved_host:?}, which is not in allowedHosts"
                    ));
                }
            }
            Err(err) => {
                errors.push(format!("actions.{name}.path does not resolve against baseUrl: {err}"));
            }
        }
    }

    if action.auth.name.trim().is_empty() {
        errors.push(format!("actions.{name}.auth.name must not be empty"));
    }
    if !manifest.required_secrets.contains(&action.auth.secret_binding) {
        errors.push(format!(
            "actions.{name}.auth.secretBinding {:?} must appear in requiredSecrets",
            action.auth.secret_binding
        ));
    }

    let limits = &action.limits;
    if limits.max_body_kb == 0 || limits.max_body_kb > 1024 {
        errors.push(format!("actions.{name}.limits.maxBodyKb must be in (0, 1024]"));
    }
    if limits.timeout_ms == 0 || limits.timeout_ms > 120_000 {
        errors.push(format!("actions.{name}.limits.timeoutMs must be in (0, 120000]"));
    }
    if limits.rate_per_minute == 0 || limits.rate_per_minute > 100_000 {
        errors.push(format!("actions.{name}.limits.ratePerMinute must be in (0, 100000]"));
    }

    for required in &action.input_schema.required {
        if !action.input_schema.properties.contains_key(required) {
            errors.push(format!(
                "actions.{name}.inputSchema.required lists {required:?}, which has no matching property"
            ));
        }
    }
}

/// `host[:port]`, lowercased, the way `allowedHosts` entries are specified.
fn host_with_port(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("weather", true ; "lowercase alnum with dash ok")]
    #[test_case("Weather", false ; "uppercase rejected")]
    #[test_case("w", false ; "too short")]
    #[test_case("_weather", false ; "must start alphanumeric")]
    fn id_pattern(id: &str, expect_ok: bool) {
        assert_eq!(ID_RE.is_match(id), expect_ok);
    }

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
                    "limits": {"maxBodyKb": 8, "timeoutMs": 10000, "ratePerMinute": 90},
                    "inputSchema": {
                        "properties": {
                            "channelId": {"type": "string", "minLength": 1, "maxLength": 128},
                            "maxResults": {"type": "integer", "minimum": 1, "maximum": 50}
                        },
                        "required": ["channelId"],
                        "additionalProperties": false
                    }
                }
            }
        })
    }

    #[test]
    fn accepts_the_seed_manifest() {
        let result = validate(&seed_manifest());
        assert!(result.is_ok(), "{:?}", result.err());
    }

    #[test]
    fn rejects_disallowed_host_after_resolution() {
        let mut raw = seed_manifest();
        raw["actions"]["list_channel_videos"]["path"] = json!("https://not-allowed.com/api");
        let errors = validate(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("not in allowedHosts")));
    }

    #[test]
    fn rejects_secret_binding_not_listed_in_required_secrets() {
        let mut raw = seed_manifest();
        raw["actions"]["list_channel_videos"]["auth"]["secretBinding"] = json!("OTHER_KEY");
        let errors = validate(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("requiredSecrets")));
    }

    #[test]
    fn rejects_non_https_base_url() {
        let mut raw = seed_manifest();
        raw["baseUrl"] = json!("http://youtube.googleapis.com");
        let errors = validate(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("https")));
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let mut raw = seed_manifest();
        raw["actions"]["list_channel_videos"]["limits"]["ratePerMinute"] = json!(0);
        let errors = validate(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("ratePerMinute")));
    }

    #[test]
    fn rejects_malformed_id() {
        let mut raw = seed_manifest();
        raw["id"] = json!("Not_Valid!");
        let errors = validate(&raw).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("id")));
    }
}
