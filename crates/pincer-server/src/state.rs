//! Long-lived process state.
//!
//! [`Registry`] and [`Vault`] borrow their [`KvStore`] for their whole
//! lifetime, which is awkward for a handle an `axum` router needs to hold
//! as `'static` shared state. This process is a single long-running daemon
//! with exactly one store, one vault, and one registry for its entire
//! life, so we leak all three once at startup (`Box::leak`) rather than
//! thread a lifetime parameter through every handler — the registry's read
//! cache then lives for the life of the process, not just one request.
//!
//! The runtime key record (`runtime:active` in the persisted key layout)
//! has no owning crate of its own: [`pincer_auth`] defines its shape, but
//! loading, storing, and rotating it is cross-cutting glue that belongs
//! here.

use std::sync::RwLock;

use pincer_auth::RuntimeKeyRecord;
use pincer_config::PincerConfig;
use pincer_error::{ApiError, ErrorKind};
use pincer_kv::{FsKv, KvStore, KvStoreExt};
use pincer_proxy::{MetricsSink, RateLimiter};
use pincer_registry::Registry;
use pincer_vault::Vault;

use crate::error::map_vault_error;

const RUNTIME_KEY: &str = "runtime:active";

/// Shared state behind every route handler.
pub struct AppState {
    /// Fully resolved runtime configuration.
    pub config: PincerConfig,
    /// The leaked, process-lifetime KV store.
    pub store: &'static dyn KvStore,
    /// The leaked, process-lifetime vault.
    pub vault: &'static Vault<'static>,
    /// The leaked, process-lifetime registry.
    pub registry: &'static Registry<'static>,
    /// Isolate-local per-action rate limiter.
    pub limiter: RateLimiter,
    /// Isolate-local rolling metrics window.
    pub metrics: MetricsSink,
    /// Outbound client the egress proxy forwards adapter calls through.
    pub http: reqwest::Client,
    runtime_key: RwLock<Option<RuntimeKeyRecord>>,
}

/// The result of a successful runtime key rotation: everything a caller
/// needs to hand off to a worker.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeRotateResult {
    /// The new key id.
    pub key_id: String,
    /// The new runtime key secret, in the clear, exactly once.
    pub runtime_key: String,
    /// The new HMAC signing secret, in the clear, exactly once.
    pub hmac_secret: String,
}

impl AppState {
    /// Open the KV store, vault, and registry, leaking each to `'static`,
    /// and load whatever runtime key record (if any) is already persisted.
    pub fn bootstrap(config: PincerConfig) -> anyhow::Result<Self> {
        let kv = FsKv::open(&config.kv_root)?;
        let kv: &'static FsKv = Box::leak(Box::new(kv));
        let store: &'static dyn KvStore = kv;

        let vault = Vault::new(store, config.kek.expose());
        let vault: &'static Vault<'static> = Box::leak(Box::new(vault));

        let registry = Registry::new(store, vault);
        let registry: &'static Registry<'static> = Box::leak(Box::new(registry));

        let runtime_key: Option<RuntimeKeyRecord> = store.get_json(RUNTIME_KEY)?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build outbound http client: {err}"))?;

        Ok(AppState {
            config,
            store,
            vault,
            registry,
            limiter: RateLimiter::new(),
            metrics: MetricsSink::new(),
            http,
            runtime_key: RwLock::new(runtime_key),
        })
    }

    /// The currently active runtime key record, if one has been minted.
    pub fn runtime_key(&self) -> Option<RuntimeKeyRecord> {
        self.runtime_key.read().expect("runtime key lock poisoned").clone()
    }

    /// Mint a new runtime key, key secret, and HMAC secret; persist the two
    /// secrets in the vault under the configured default bindings, then
    /// overwrite the runtime key record so the old secret is immediately
    /// invalid.
    pub fn rotate_runtime_key(&self, actor: &str) -> Result<RuntimeRotateResult, ApiError> {
        let key_id = format!("rk_{}", pincer_crypto::random_hex(8));
        let key_secret = pincer_crypto::random_hex(32);
        let hmac_secret = pincer_crypto::random_hex(32);

        self.vault
            .put(&self.config.default_key_secret_binding, &key_secret, actor)
            .map_err(map_vault_error)?;
        self.vault
            .put(&self.config.default_hmac_secret_binding, &hmac_secret, actor)
            .map_err(map_vault_error)?;

        let record = RuntimeKeyRecord {
            id: key_id.clone(),
            key_hash: pincer_crypto::sha256_hex(key_secret.as_bytes()),
            hmac_secret_binding: Some(self.config.default_hmac_secret_binding.clone()),
            key_secret_binding: Some(self.config.default_key_secret_binding.clone()),
            skew_seconds: self.config.skew_seconds,
            updated_at: now_rfc3339(),
        };

        self.store
            .put_json(RUNTIME_KEY, &record)
            .map_err(|_| ApiError::new(ErrorKind::InternalError))?;

        *self.runtime_key.write().expect("runtime key lock poisoned") = Some(record);
        tracing::info!(key_id, actor, "runtime key rotated");

        Ok(RuntimeRotateResult { key_id, runtime_key: key_secret, hmac_secret })
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
