//! HMAC-SHA-256 signing and constant-time verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::hash::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Compute `HMAC-SHA256(secret, message)`, hex-encoded.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    // `Hmac::new_from_slice` only fails for invalid key *lengths*, and
    // HMAC accepts keys of any length (short keys are zero-padded,
    // long ones are hashed down), so this can't actually fail.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify that `presented_hex` is the correct `HMAC-SHA256(secret, message)`,
/// in constant time.
///
/// `presented_hex` may carry a leading `v1=` version prefix, which is
/// stripped before comparison.
pub fn verify_hmac_sha256_hex(secret: &[u8], message: &[u8], presented_hex: &str) -> bool {
    let presented = presented_hex.strip_prefix("v1=").unwrap_or(presented_hex);
    let expected = hmac_sha256_hex(secret, message);
    constant_time_eq(expected.as_bytes(), presented.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_with_and_without_version_prefix() {
        let sig = hmac_sha256_hex(b"topsecret", b"hello world");
        assert!(verify_hmac_sha256_hex(b"topsecret", b"hello world", &sig));
        assert!(verify_hmac_sha256_hex(
            b"topsecret",
            b"hello world",
            &format!("v1={sig}")
        ));
    }

    #[test]
    fn rejects_wrong_signature() {
        let sig = hmac_sha256_hex(b"topsecret", b"hello world");
        assert!(!verify_hmac_sha256_hex(b"wrongsecret", b"hello world", &sig));
        assert!(!verify_hmac_sha256_hex(b"topsecret", b"goodbye world", &sig));
    }
}
