//! Low-level cryptography wrappers used by the Pincer egress boundary.
//!
//! Every primitive the boundary relies on — request signing, the vault's
//! authenticated encryption, password hashing, constant-time comparison —
//! lives here so that the rest of the codebase never reaches for `sha2` or
//! `aes-gcm` directly. Nothing in this crate talks to the KV store or the
//! network; it is pure functions over bytes.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod aead;
mod hash;
mod hmac_sig;
mod password;
mod random;
mod secret;

pub use aead::{decrypt, encrypt, AeadError, Nonce, NONCE_LEN};
pub use hash::{constant_time_eq, sha256, sha256_hex};
pub use hmac_sig::{hmac_sha256_hex, verify_hmac_sha256_hex};
pub use password::{hash_password, verify_password, PBKDF2_ITERATIONS, SALT_LEN};
pub use random::{random_bytes, random_hex, random_token};
pub use secret::Secret;
