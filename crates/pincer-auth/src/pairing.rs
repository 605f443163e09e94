//! The pairing store: short-lived one-time codes that hand a worker host
//! its runtime key, key secret, and HMAC secret.

use serde::{Deserialize, Serialize};

use pincer_crypto::random_token;
use pincer_error::{ApiError, ErrorKind};
use pincer_kv::{KvStore, KvStoreExt};

const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const CODE_GROUP_LEN: usize = 4;
const TTL_SECONDS: i64 = 15 * 60;

fn pairing_key(code: &str) -> String {
    format!("pairing:{code}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PairingRecord {
    #[serde(rename = "workerUrl")]
    worker_url: String,
    #[serde(rename = "runtimeKey")]
    runtime_key: String,
    #[serde(rename = "hmacSecret")]
    hmac_secret: String,
    #[serde(rename = "expiresAtMs")]
    expires_at_ms: i64,
}

/// The triple handed off when a pairing code is consumed.
#[derive(Debug, Clone)]
pub struct PairingPayload {
    /// The worker's callback URL.
    pub worker_url: String,
    /// The newly minted runtime key secret.
    pub runtime_key: String,
    /// The newly minted HMAC signing secret.
    pub hmac_secret: String,
}

/// Generate an 8-character code (`XXXX-XXXX`) and store `payload` under it
/// with a 15-minute TTL.
pub fn create(store: &dyn KvStore, payload: PairingPayload) -> Result<(String, u64), ApiError> {
    let raw = random_token(CODE_GROUP_LEN * 2, ALPHABET);
    let code = format!("{}-{}", &raw[..CODE_GROUP_LEN], &raw[CODE_GROUP_LEN..]);

    let now_ms = now_unix_millis();
    let record = PairingRecord {
        worker_url: payload.worker_url,
        runtime_key: payload.runtime_key,
        hmac_secret: payload.hmac_secret,
        expires_at_ms: now_ms + TTL_SECONDS * 1000,
    };
    store
        .put_json(&pairing_key(&code), &record)
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;
    tracing::info!("pairing code issued");
    Ok((code, TTL_SECONDS as u64))
}

/// Consume a pairing code: delete-then-return, so a code is usable at
/// most once even if two callers race (the first successful delete wins;
/// the loser observes absence).
pub fn consume(store: &dyn KvStore, presented_code: &str) -> Result<PairingPayload, ApiError> {
    let code = presented_code.trim().to_ascii_uppercase();
    let raw: Option<serde_json::Value> = store
        .get_json(&pairing_key(&code))
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;

    let Some(raw) = raw else {
        return Err(ApiError::new(ErrorKind::InvalidOrExpiredCode));
    };

    store
        .delete(&pairing_key(&code))
        .map_err(|_| ApiError::new(ErrorKind::InternalError))?;

    let record: PairingRecord = match serde_json::from_value(raw) {
        Ok(record) => record,
        Err(_) => return Err(ApiError::new(ErrorKind::CorruptPairingRecord)),
    };

    if now_unix_millis() > record.expires_at_ms {
        return Err(ApiError::new(ErrorKind::InvalidOrExpiredCode));
    }

    Ok(PairingPayload {
        worker_url: record.worker_url,
        runtime_key: record.runtime_key,
        hmac_secret: record.hmac_secret,
    })
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

    fn store() -> (tempfile::TempDir, FsKv) {
        let dir = tempfile::tempdir().unwrap();
        let kv = FsKv::open(dir.path()).unwrap();
        (dir, kv)
    }

    fn payload() -> PairingPayload {
        PairingPayload {
            worker_url: "https://worker.example/".to_owned(),
            runtime_key: "rk_abc".to_owned(),
            hmac_secret: "hm_def".to_owned(),
        }
    }

    #[test]
    fn create_then_consume_round_trips() {
        let (_dir, kv) = store();
        let (code, ttl) = create(&kv, payload()).unwrap();
        assert_eq!(ttl, TTL_SECONDS as u64);
        assert_eq!(code.len(), 9);
        assert_eq!(code.chars().nth(4), Some('-'));

        let consumed = consume(&kv, &code).unwrap();
        assert_eq!(consumed.worker_url, "https://worker.example/");
    }

    #[test]
    fn consume_is_case_and_whitespace_insensitive() {
        let (_dir, kv) = store();
        let (code, _) = create(&kv, payload()).unwrap();
        let sloppy = format!("  {} ", code.to_ascii_lowercase());
        assert!(consume(&kv, &sloppy).is_ok());
    }

    #[test]
    fn consume_is_one_time_only() {
        let (_dir, kv) = store();
        let (code, _) = create(&kv, payload()).unwrap();
        consume(&kv, &code).unwrap();
        let second = consume(&kv, &code);
        assert!(second.is_err());
    }

    #[test]
    fn consume_rejects_unknown_code() {
        let (_dir, kv) = store();
        let result = consume(&kv, "ZZZZ-ZZZZ");
        assert!(result.is_err());
    }
}
