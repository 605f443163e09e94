//! Wire/in-memory shape of a validated adapter manifest.
//!
//! These types are the *output* of [`crate::validate::validate`]; nothing
//! upstream of validation should construct one by hand, since the field
//! invariants (regex-shaped ids, HTTPS-only URLs, cross-references between
//! `auth.secretBinding` and `requiredSecrets`) are exactly what validation
//! exists to establish.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// An immutable, validated adapter manifest, content-addressed by
/// `(id, revision)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Adapter id, `^[a-z0-9][a-z0-9_-]{1,63}$`.
    pub id: String,
    /// Monotonically increasing revision number.
    pub revision: u64,
    /// HTTPS base URL every action's `path` resolves against.
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    /// Lower-cased `host[:port]` values this adapter may call, no
    /// wildcards. Always includes `baseUrl`'s own host.
    #[serde(rename = "allowedHosts")]
    pub allowed_hosts: BTreeSet<String>,
    /// Vault binding names this adapter needs resolved before activation.
    #[serde(rename = "requiredSecrets")]
    pub required_secrets: BTreeSet<String>,
    /// Action name to action definition.
    pub actions: BTreeMap<String, Action>,
}

/// A single callable operation inside an adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// HTTP method used for the upstream call.
    pub method: Method,
    /// Absolute path, resolved against the manifest's `baseUrl`.
    pub path: String,
    /// How `input` is placed on the upstream request.
    #[serde(rename = "requestMode")]
    pub request_mode: RequestMode,
    /// How the resolved secret is attached to the upstream request.
    pub auth: ActionAuth,
    /// Body size, timeout, and rate limit ceilings.
    pub limits: ActionLimits,
    /// JSON-Schema subset describing the shape of `input`.
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

/// HTTP method an action may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`.
    Get,
    /// `POST`.
    Post,
}

impl Method {
    /// The uppercase wire/HTTP form of this method.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// How an action's `input` is attached to the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    /// Each input entry becomes a query string parameter.
    Query,
    /// `input` is serialized as a JSON request body.
    Json,
}

/// Where and how a resolved secret is attached to the upstream request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionAuth {
    /// Whether the secret goes in a header or a query parameter.
    pub placement: AuthPlacement,
    /// Header or query parameter name.
    pub name: String,
    /// Vault binding name; must appear in the manifest's `requiredSecrets`.
    #[serde(rename = "secretBinding")]
    pub secret_binding: String,
    /// Optional string prepended to the secret value (e.g. `"Bearer "`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Where a resolved secret is placed on the upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPlacement {
    /// The secret is set as an HTTP header value.
    Header,
    /// The secret is appended as a query string parameter.
    Query,
}

/// Resource ceilings enforced by the egress proxy for one action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionLimits {
    /// Maximum request body size, in KiB; `(0, 1024]`.
    #[serde(rename = "maxBodyKb")]
    pub max_body_kb: u32,
    /// Upstream call timeout, in milliseconds; `(0, 120000]`.
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: u32,
    /// Requests per minute bucket; `(0, 100000]`.
    #[serde(rename = "ratePerMinute")]
    pub rate_per_minute: u32,
}

/// A JSON-Schema subset describing the shape of an action's `input` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    /// Property name to property schema.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// Property names that must be present.
    #[serde(default)]
    pub required: BTreeSet<String>,
    /// Whether properties outside `properties` are tolerated.
    #[serde(default, rename = "additionalProperties")]
    pub additional_properties: bool,
}

/// The schema for a single `input` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertySchema {
    /// A string, optionally bounded by length and/or restricted to an enum.
    String {
        /// Minimum length, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "minLength")]
        min_length: Option<u64>,
        /// Maximum length, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "maxLength")]
        max_length: Option<u64>,
        /// Allowed values, if restricted.
        #[serde(default, skip_serializing_if = "Option::is_none", rename = "enum")]
        enum_values: Option<Vec<String>>,
    },
    /// A whole number, optionally bounded.
    Integer {
        /// Minimum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        /// Maximum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    /// A finite floating-point number, optionally bounded.
    Number {
        /// Minimum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        /// Maximum value, inclusive.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    /// A boolean; no further constraints are expressible.
    Boolean,
}
