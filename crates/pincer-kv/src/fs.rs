//! Filesystem-backed [`KvStore`].

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(target_family = "unix")]
use std::os::unix::fs::DirBuilderExt;

use fs_mistrust::Mistrust;

use crate::{validate_key, KvError, KvStore, Result};

/// A [`KvStore`] that keeps one file per key under a private directory,
/// guarded by an exclusive lock file.
///
/// Unlike a state manager that starts read-only and must be explicitly
/// locked, an `FsKv` takes the write lock eagerly at open time: the
/// boundary process is a single long-running daemon, not a collection
/// of cooperating short-lived readers, so there is no use case for an
/// unlocked, read-only handle.
pub struct FsKv {
    /// Directory holding one file per stored key.
    dir: PathBuf,
    /// Exclusive lock held for the lifetime of this store.
    _lock: Mutex<fslock::LockFile>,
}

impl FsKv {
    /// Open (creating if necessary) a KV store rooted at `path`.
    ///
    /// The directory is created with mode `0700` and then audited with
    /// [`fs_mistrust`] to confirm it is owned by the running user and not
    /// group- or world-readable; a store backing a secret vault must not
    /// silently tolerate a loosely permissioned directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let dir = path.as_ref().to_path_buf();

        let mut builder = DirBuilder::new();
        #[cfg(target_family = "unix")]
        builder.mode(0o700);
        builder.recursive(true).create(&dir)?;

        Mistrust::new().check(&dir)?;

        let lockpath = dir.with_extension("lock");
        let mut lockfile = fslock::LockFile::open(&lockpath).map_err(KvError::Io)?;
        lockfile.lock().map_err(KvError::Io)?;

        Ok(FsKv {
            dir,
            _lock: Mutex::new(lockfile),
        })
    }

    /// Map a key to the file that stores it.
    ///
    /// Keys are restricted by [`validate_key`] to a filesystem-safe
    /// character set and used verbatim as filenames; there is no nested
    /// directory scheme, since the namespace's busiest prefixes (adapter
    /// manifests, audit events) are already flat and colon-delimited.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl KvStore for FsKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let target = self.path_for(key);
        let tmp = target.with_extension("tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.ends_with(".tmp") || !name.starts_with(prefix) {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            out.push((name, bytes));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::KvStoreExt;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKv::open(dir.path()).unwrap();

        store.put("runtime:active", b"hello").unwrap();
        assert_eq!(store.get("runtime:active").unwrap().unwrap(), b"hello");
        assert!(store.get("runtime:missing").unwrap().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKv::open(dir.path()).unwrap();

        store.put("k", b"v").unwrap();
        store.delete("k").unwrap();
        store.delete("k").unwrap();
        assert!(store.get("k").unwrap().is_none());
    }

    #[test]
    fn list_prefix_finds_only_matching_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKv::open(dir.path()).unwrap();

        store
            .put("adapter_registry:manifest:weather-api:1", b"a")
            .unwrap();
        store
            .put("adapter_registry:manifest:weather-api:2", b"b")
            .unwrap();
        store.put("adapter_registry:index", b"c").unwrap();

        let mut found = store
            .list_prefix("adapter_registry:manifest:weather-api:")
            .unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].1, b"a");
    }

    #[test]
    fn typed_helpers_round_trip_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKv::open(dir.path()).unwrap();

        let widget = Widget {
            name: "sprocket".into(),
            count: 3,
        };
        store.put_json("widget:1", &widget).unwrap();

        let back: Option<Widget> = store.get_json("widget:1").unwrap();
        assert_eq!(back, Some(widget));
    }

    #[test]
    fn reopening_after_drop_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FsKv::open(dir.path()).unwrap();
            store.put("k", b"persisted").unwrap();
        }
        let store = FsKv::open(dir.path()).unwrap();
        assert_eq!(store.get("k").unwrap().unwrap(), b"persisted");
    }

    #[test]
    fn rejects_invalid_key_characters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsKv::open(dir.path()).unwrap();
        let err = store.put("bad/../key", b"x").unwrap_err();
        assert!(matches!(err, KvError::InvalidKey(_)));
    }
}
