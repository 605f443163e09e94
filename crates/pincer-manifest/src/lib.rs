//! Adapter manifest types, the manifest validator, and canonical JSON
//! stringification.
//!
//! These are pure, side-effect-free functions shared by the signed-request
//! verifier (to look up an action's schema), the adapter registry (to
//! validate proposals and applies, and to detect revision conflicts), and
//! the egress proxy (to validate `input` against an action's schema).

#![warn(missing_docs)]
#![deny(unreachable_pub)]
#![deny(clippy::unwrap_used)]

mod input;
mod stable_stringify;
mod types;
mod validate;

pub use input::validate_input;
pub use stable_stringify::stable_stringify;
pub use types::{
    Action, ActionAuth, ActionLimits, AuthPlacement, InputSchema, Manifest, Method,
    PropertySchema, RequestMode,
};
pub use validate::validate;
