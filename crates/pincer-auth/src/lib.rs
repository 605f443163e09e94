//! Authentication and authorization primitives for the Pincer egress
//! boundary: the signed-request verifier runtime hosts use, the admin
//! cookie-session store, and the one-time pairing code exchange.
//!
//! Every type here is transport-agnostic — headers and cookies are plain
//! `&str`/`Option<&str>`, never `axum` types — so this crate has no
//! dependency on any particular HTTP framework. Wiring it to request
//! extractors and `Set-Cookie` headers is the binary crate's job.

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod pairing;
mod session;
mod verify;

pub use pairing::{consume as consume_pairing_code, create as create_pairing_code, PairingPayload};
pub use session::{
    bootstrap, client_id, enforce as enforce_session, login, logout, needs_bootstrap, SessionOutcome,
};
pub use verify::{
    canonical_signing_string, verify, RuntimeKeyRecord, SignedRequestHeaders, DEFAULT_HMAC_SECRET_BINDING,
    DEFAULT_KEY_SECRET_BINDING,
};
