//! The single flat KV namespace the whole boundary is built on.
//!
//! Every persistent record described in the data model — the runtime key,
//! adapter manifests, the registry index, proposals, audit events, pairing
//! records, the admin user and its sessions, and vault secrets — is a value
//! under one string key in this namespace (see the "Persisted key layout"
//! table). This crate provides that namespace as a trait, [`KvStore`], plus
//! a filesystem-backed implementation, [`FsKv`], using the same on-disk
//! state manager design: one file per key, a lock file for single-writer
//! discipline, and atomic write-then-rename so a crash never leaves a
//! half-written record.
//!
//! Reads and writes are linearizable only at the per-key level (see the
//! Concurrency & Resource Model): two different keys may be written in
//! either order relative to each other, and callers that need a stronger
//! ordering guarantee (e.g. the registry's snapshot-then-index write) must
//! sequence their own calls.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod fs;

pub use fs::FsKv;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised by a [`KvStore`] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KvError {
    /// The underlying filesystem (or other storage medium) reported an
    /// error.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored value could not be parsed back into the type asked for.
    #[error("stored value is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// The store's root directory failed a permission audit.
    #[error("storage root is not private: {0}")]
    Untrusted(#[from] fs_mistrust::Error),
    /// A caller tried to use a key containing characters the store cannot
    /// safely represent as a filename.
    #[error("key {0:?} contains a disallowed character")]
    InvalidKey(String),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, KvError>;

/// A single flat, string-keyed namespace of opaque byte values.
///
/// Implementations need only provide byte-level get/put/delete/list;
/// [`KvStoreExt`] layers typed JSON convenience methods on top.
pub trait KvStore: Send + Sync {
    /// Fetch the raw bytes stored at `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key`, overwriting any existing value.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove the value at `key`, if any. Not an error if absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// List all `(key, value)` pairs whose key starts with `prefix`.
    ///
    /// No ordering is guaranteed; callers that need a particular order
    /// (e.g. the registry's time-ordered audit listing) must sort the
    /// result themselves.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

/// Typed convenience methods layered over any [`KvStore`].
pub trait KvStoreExt: KvStore {
    /// Fetch and deserialize the JSON value at `key`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize `value` as JSON and store it at `key`.
    fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, &bytes)
    }

    /// List all values under `prefix`, skipping any that fail to
    /// deserialize (logged, not propagated, so one corrupt record cannot
    /// take down an entire listing).
    fn list_prefix_json<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<(String, T)>> {
        let mut out = Vec::new();
        for (key, bytes) in self.list_prefix(prefix)? {
            match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => out.push((key, value)),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "skipping corrupt record during prefix listing");
                }
            }
        }
        Ok(out)
    }
}

impl<T: KvStore + ?Sized> KvStoreExt for T {}

/// Validate that `key` only contains characters this store can represent as
/// a filename without ambiguity: ASCII letters, digits, `:`, `_`, `-`, `.`.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-' | b'.'));
    if ok {
        Ok(())
    } else {
        Err(KvError::InvalidKey(key.to_owned()))
    }
}
