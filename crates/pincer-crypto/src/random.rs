//! Random byte/token generation backed by the OS CSPRNG.

use rand::Rng;
use rand_core::{OsRng, RngCore};

/// Fill and return `len` cryptographically random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Return `len` random bytes, hex-encoded (so the resulting string is
/// `2 * len` characters long).
pub fn random_hex(len: usize) -> String {
    hex::encode(random_bytes(len))
}

/// Generate a random token of `len` characters drawn from `alphabet`.
///
/// Used for pairing codes, which are drawn from a deliberately
/// ambiguity-free 32-symbol alphabet rather than hex.
pub fn random_token(len: usize, alphabet: &[u8]) -> String {
    let mut rng = rand::rngs::OsRng;
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..alphabet.len());
            alphabet[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_expected_length() {
        assert_eq!(random_hex(24).len(), 48);
    }

    #[test]
    fn random_token_uses_only_alphabet_symbols() {
        let alphabet = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
        let token = random_token(8, alphabet);
        assert_eq!(token.len(), 8);
        assert!(token.bytes().all(|b| alphabet.contains(&b)));
    }

    #[test]
    fn successive_calls_differ() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}
