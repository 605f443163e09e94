//! The secret vault: an AES-256-GCM encrypted KV namespace for provider
//! credentials, with a resolver that falls back to process environment
//! variables.
//!
//! Every entry lives at `vault:secret:<binding>` in the shared KV
//! namespace. Plaintext is never returned through [`Vault::list_metadata`]
//! or any other general admin-surface call — only [`Vault::get`] and
//! [`Vault::resolve`] see decrypted values, and both are consumed solely by
//! the egress proxy's request builder and the admin rotate/pairing flows.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use pincer_kv::{KvStore, KvStoreExt};

static BINDING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]{1,128}$").expect("static regex is valid"));

/// Errors raised by the vault.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum VaultError {
    /// The underlying KV store failed.
    #[error(transparent)]
    Kv(#[from] pincer_kv::KvError),
    /// The binding name did not match `^[A-Za-z0-9_]{1,128}$`.
    #[error("binding {0:?} is not a valid vault binding name")]
    InvalidBinding(String),
    /// A `put` was attempted with an empty plaintext value.
    #[error("secret value must not be empty")]
    EmptyValue,
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, VaultError>;

/// The on-disk shape of a vault entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultRecord {
    #[serde(rename = "keyId")]
    key_id: String,
    nonce: String,
    ciphertext: String,
    #[serde(rename = "updatedAt")]
    updated_at: String,
    #[serde(rename = "updatedBy")]
    updated_by: String,
}

/// Metadata about one binding, as exposed to the admin surface — never the
/// plaintext itself.
#[derive(Debug, Clone, Serialize)]
pub struct SecretMetadata {
    /// The binding name.
    pub binding: String,
    /// Whether the binding currently resolves to a non-empty value, via the
    /// vault or an environment variable fallback.
    pub present: bool,
    /// When the vault entry (if any) was last written.
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// The secret vault.
pub struct Vault<'a> {
    store: &'a dyn KvStore,
    kek: Vec<u8>,
}

impl<'a> Vault<'a> {
    /// Construct a vault over `store`, deriving its storage key from `kek`.
    pub fn new(store: &'a dyn KvStore, kek: &[u8]) -> Self {
        Vault { store, kek: kek.to_vec() }
    }

    fn key_for(binding: &str) -> String {
        format!("vault:secret:{binding}")
    }

    fn check_binding(binding: &str) -> Result<()> {
        if BINDING_RE.is_match(binding) {
            Ok(())
        } else {
            Err(VaultError::InvalidBinding(binding.to_owned()))
        }
    }

    /// Encrypt and store `plaintext` under `binding`.
    pub fn put(&self, binding: &str, plaintext: &str, updated_by: &str) -> Result<()> {
        Self::check_binding(binding)?;
        if plaintext.is_empty() {
            return Err(VaultError::EmptyValue);
        }
        let (nonce, ciphertext) = pincer_crypto::encrypt(&self.kek, plaintext.as_bytes());
        let record = VaultRecord {
            key_id: "v1".to_owned(),
            nonce: hex::encode(nonce),
            ciphertext: hex::encode(ciphertext),
            updated_at: now_rfc3339(),
            updated_by: updated_by.to_owned(),
        };
        self.store.put_json(&Self::key_for(binding), &record)?;
        tracing::info!(binding, updated_by, "vault entry written");
        Ok(())
    }

    /// Fetch and decrypt the plaintext stored at `binding`.
    ///
    /// A decrypt failure (corrupt record, wrong KEK) is treated as absence,
    /// not an error: callers must treat an empty string as "no secret".
    pub fn get(&self, binding: &str) -> Result<String> {
        Self::check_binding(binding)?;
        let Some(record) = self.store.get_json::<VaultRecord>(&Self::key_for(binding))? else {
            return Ok(String::new());
        };
        let (Ok(nonce), Ok(ciphertext)) = (hex::decode(&record.nonce), hex::decode(&record.ciphertext))
        else {
            tracing::warn!(binding, "vault record has malformed hex fields");
            return Ok(String::new());
        };
        match pincer_crypto::decrypt(&self.kek, &nonce, &ciphertext) {
            Ok(bytes) => Ok(String::from_utf8(bytes).unwrap_or_default()),
            Err(_) => {
                tracing::warn!(binding, "vault entry failed to decrypt");
                Ok(String::new())
            }
        }
    }

    /// Resolve `binding` to a usable secret value: the vault plaintext if
    /// non-empty, else the same-named environment variable, else empty.
    pub fn resolve(&self, binding: &str) -> Result<String> {
        let from_vault = self.get(binding)?;
        if !from_vault.is_empty() {
            return Ok(from_vault);
        }
        Ok(std::env::var(binding).unwrap_or_default())
    }

    /// Delete the vault entry at `binding`, if any.
    pub fn delete(&self, binding: &str) -> Result<()> {
        Self::check_binding(binding)?;
        self.store.delete(&Self::key_for(binding))?;
        Ok(())
    }

    /// List metadata for the union of `hints` and the set of bindings that
    /// actually have a vault entry, without ever exposing plaintext.
    pub fn list_metadata(&self, hints: &[String]) -> Result<Vec<SecretMetadata>> {
        let mut names: BTreeSet<String> = hints.iter().cloned().collect();
        for (key, _) in self.store.list_prefix("vault:secret:")? {
            if let Some(binding) = key.strip_prefix("vault:secret:") {
                names.insert(binding.to_owned());
            }
        }

        let mut out = Vec::with_capacity(names.len());
        for binding in names {
            let record: Option<VaultRecord> = self.store.get_json(&Self::key_for(&binding))?;
            let present = !self.resolve(&binding)?.is_empty();
            out.push(SecretMetadata {
                updated_at: record.map(|r| r.updated_at),
                present,
                binding,
            });
        }
        Ok(out)
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pincer_kv::FsKv;

    fn vault(dir: &std::path::Path) -> FsKv {
        FsKv::open(dir).unwrap()
    }

    #[test]
    fn put_then_get_round_trips_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"a test kek");

        vault.put("YOUTUBE_API_KEY", "sk-abc123", "admin").unwrap();
        assert_eq!(vault.get("YOUTUBE_API_KEY").unwrap(), "sk-abc123");
    }

    #[test]
    fn get_on_missing_binding_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");
        assert_eq!(vault.get("NEVER_SET").unwrap(), "");
    }

    #[test]
    fn resolve_falls_back_to_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");

        std::env::set_var("PINCER_TEST_ENV_BINDING", "env-value");
        assert_eq!(vault.resolve("PINCER_TEST_ENV_BINDING").unwrap(), "env-value");
        std::env::remove_var("PINCER_TEST_ENV_BINDING");
    }

    #[test]
    fn resolve_prefers_vault_over_environment() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");

        std::env::set_var("PINCER_TEST_PRECEDENCE", "env-value");
        vault.put("PINCER_TEST_PRECEDENCE", "vault-value", "admin").unwrap();
        assert_eq!(vault.resolve("PINCER_TEST_PRECEDENCE").unwrap(), "vault-value");
        std::env::remove_var("PINCER_TEST_PRECEDENCE");
    }

    #[test]
    fn rejects_invalid_binding_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");
        assert!(matches!(
            vault.put("not-a-valid-binding!", "x", "admin"),
            Err(VaultError::InvalidBinding(_))
        ));
    }

    #[test]
    fn rejects_empty_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");
        assert!(matches!(vault.put("SOME_KEY", "", "admin"), Err(VaultError::EmptyValue)));
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");

        vault.put("TO_DELETE", "value", "admin").unwrap();
        vault.delete("TO_DELETE").unwrap();
        assert_eq!(vault.get("TO_DELETE").unwrap(), "");
    }

    #[test]
    fn list_metadata_never_exposes_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let store = vault(dir.path());
        let vault = Vault::new(&store, b"kek");

        vault.put("VISIBLE_KEY", "super-secret", "admin").unwrap();
        let listing = vault.list_metadata(&["HINTED_BUT_UNSET".to_owned()]).unwrap();

        let json = serde_json::to_string(&listing).unwrap();
        assert!(!json.contains("super-secret"));
        assert!(listing.iter().any(|m| m.binding == "VISIBLE_KEY" && m.present));
        assert!(listing.iter().any(|m| m.binding == "HINTED_BUT_UNSET" && !m.present));
    }
}
