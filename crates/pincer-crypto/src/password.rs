//! PBKDF2-HMAC-SHA-256 password hashing for the admin account.

use pbkdf2::pbkdf2_hmac;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use crate::hash::constant_time_eq;

/// Iteration count mandated for admin password hashing.
pub const PBKDF2_ITERATIONS: u32 = 120_000;

/// Length, in bytes, of a freshly generated salt.
pub const SALT_LEN: usize = 16;

/// Length, in bytes, of the derived password hash.
const HASH_LEN: usize = 32;

/// Generate a random salt and hash `password` with it.
///
/// Returns `(salt_hex, hash_hex)`.
pub fn hash_password(password: &str) -> (String, String) {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let hash = derive(password.as_bytes(), &salt, PBKDF2_ITERATIONS);
    (hex::encode(salt), hex::encode(hash))
}

/// Verify `password` against a stored `salt_hex`/`hash_hex`/`iterations`,
/// in constant time.
pub fn verify_password(password: &str, salt_hex: &str, hash_hex: &str, iterations: u32) -> bool {
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };
    let actual = derive(password.as_bytes(), &salt, iterations);
    constant_time_eq(&actual, &expected)
}

/// Derive a `HASH_LEN`-byte key via PBKDF2-HMAC-SHA-256.
fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let (salt, hash) = hash_password("correct horse battery staple");
        assert!(verify_password(
            "correct horse battery staple",
            &salt,
            &hash,
            PBKDF2_ITERATIONS
        ));
    }

    #[test]
    fn rejects_wrong_password() {
        let (salt, hash) = hash_password("correct horse battery staple");
        assert!(!verify_password("wrong password", &salt, &hash, PBKDF2_ITERATIONS));
    }

    #[test]
    fn distinct_calls_use_distinct_salts() {
        let (salt1, _) = hash_password("same password");
        let (salt2, _) = hash_password("same password");
        assert_ne!(salt1, salt2);
    }
}
