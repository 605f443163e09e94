//! AES-256-GCM authenticated encryption, used by the secret vault.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce as GcmNonce};
use rand_core::{OsRng, RngCore};

use crate::hash::sha256;

/// Length in bytes of the random nonce used for every encryption.
pub const NONCE_LEN: usize = 12;

/// A fresh, randomly generated nonce.
pub type Nonce = [u8; NONCE_LEN];

/// Errors from encryption or decryption.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AeadError {
    /// The ciphertext did not decrypt under the given key/nonce (wrong key,
    /// corrupt data, or tampering).
    #[error("authenticated decryption failed")]
    DecryptionFailed,
    /// The stored nonce was not exactly [`NONCE_LEN`] bytes.
    #[error("malformed nonce")]
    MalformedNonce,
}

/// Derive the 256-bit AES key from a key-encrypting-key (KEK), the way the
/// vault derives its storage key: `key = SHA-256(kek)`.
fn derive_key(kek: &[u8]) -> [u8; 32] {
    sha256(kek)
}

/// Encrypt `plaintext` under `SHA-256(kek)` with a freshly generated nonce.
///
/// Returns `(nonce, ciphertext)`. The caller is responsible for persisting
/// both; decryption requires both.
pub fn encrypt(kek: &[u8], plaintext: &[u8]) -> (Nonce, Vec<u8>) {
    let key_bytes = derive_key(kek);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = GcmNonce::from_slice(&nonce_bytes);

    // `encrypt` only fails if the internal counter would overflow for this
    // single call, which cannot happen for the plaintext sizes the vault
    // handles (bound by maxBodyKb-scale secrets, not streamed gigabytes).
    #[allow(clippy::expect_used)]
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("AES-256-GCM encryption of a bounded-size secret cannot fail");

    (nonce_bytes, ciphertext)
}

/// Decrypt `ciphertext` under `SHA-256(kek)` using the given nonce.
pub fn decrypt(kek: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AeadError> {
    if nonce.len() != NONCE_LEN {
        return Err(AeadError::MalformedNonce);
    }
    let key_bytes = derive_key(kek);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = GcmNonce::from_slice(nonce);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| AeadError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_nonempty_plaintext() {
        let kek = b"a process-wide key encrypting key";
        let plaintext = b"sk-provider-secret-value";
        let (nonce, ciphertext) = encrypt(kek, plaintext);
        let recovered = decrypt(kek, &nonce, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn rejects_wrong_key() {
        let (nonce, ciphertext) = encrypt(b"kek-one", b"value");
        assert!(decrypt(b"kek-two", &nonce, &ciphertext).is_err());
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let (nonce, mut ciphertext) = encrypt(b"kek", b"value");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;
        assert!(decrypt(b"kek", &nonce, &ciphertext).is_err());
    }

    #[test]
    fn distinct_calls_use_distinct_nonces() {
        let (n1, _) = encrypt(b"kek", b"value");
        let (n2, _) = encrypt(b"kek", b"value");
        assert_ne!(n1, n2);
    }
}
