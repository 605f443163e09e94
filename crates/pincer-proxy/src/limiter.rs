//! Per-action, per-minute rate limiting.
//!
//! Counters are isolate-local and best-effort (see the Concurrency &
//! Resource Model): this is throttling, not an authoritative quota. Per
//! the Open Question on unbounded growth, [`RateLimiter::evict_stale`]
//! sweeps buckets more than two minutes old so the map doesn't grow
//! without bound across the lifetime of a long-running process.

use std::collections::HashMap;
use std::sync::Mutex;

/// Width of one rate-limit bucket, in milliseconds.
const BUCKET_MS: i64 = 60_000;
/// Buckets older than this many bucket-widths are considered stale.
const STALE_BUCKETS: i64 = 2;

#[derive(Hash, PartialEq, Eq, Clone)]
struct BucketKey {
    key_id: String,
    adapter: String,
    action: String,
    bucket: i64,
}

/// An in-process per-`(keyId, adapter, action, minuteBucket)` counter map.
#[derive(Default)]
pub struct RateLimiter {
    counts: Mutex<HashMap<BucketKey, u32>>,
}

impl RateLimiter {
    /// Construct an empty limiter.
    pub fn new() -> Self {
        RateLimiter::default()
    }

    /// Bucket `now_ms` into the current minute.
    pub fn bucket_for(now_ms: i64) -> i64 {
        now_ms.div_euclid(BUCKET_MS)
    }

    /// Atomically check the current bucket's count against `limit` and, if
    /// under it, increment.
    ///
    /// Returns `true` if the request is allowed (and was counted), `false`
    /// if the limit was already reached for this bucket.
    pub fn check_and_increment(
        &self,
        key_id: &str,
        adapter: &str,
        action: &str,
        limit: u32,
        now_ms: i64,
    ) -> bool {
        let key = BucketKey {
            key_id: key_id.to_owned(),
            adapter: adapter.to_owned(),
            action: action.to_owned(),
            bucket: Self::bucket_for(now_ms),
        };
        let mut counts = self.counts.lock().expect("rate limiter mutex poisoned");
        let entry = counts.entry(key).or_insert(0);
        if *entry >= limit {
            return false;
        }
        *entry += 1;
        true
    }

    /// Remove every bucket more than [`STALE_BUCKETS`] bucket-widths old
    /// relative to `now_ms`.
    pub fn evict_stale(&self, now_ms: i64) {
        let current = Self::bucket_for(now_ms);
        let mut counts = self.counts.lock().expect("rate limiter mutex poisoned");
        counts.retain(|key, _| current - key.bucket <= STALE_BUCKETS);
    }

    /// Number of buckets currently tracked. Test/introspection only.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.counts.lock().expect("rate limiter mutex poisoned").len()
    }
}
