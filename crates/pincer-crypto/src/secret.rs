//! A newtype that refuses to print its contents.
//!
//! Plaintext secrets (vault values, runtime key secrets, the KEK) pass
//! through many layers of the boundary. Wrapping them in [`Secret`] makes
//! it a compile error to `{:?}`/`{}`-format one by accident into a log line
//! or an error message, keeping sensitive values out of `tracing` output.

use std::fmt;
use zeroize::Zeroize;

/// A value that is never displayed and whose backing memory is zeroed on
/// drop.
#[derive(Clone)]
pub struct Secret<T: Zeroize + Clone>(T);

impl<T: Zeroize + Clone> Secret<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Secret(value)
    }

    /// Borrow the wrapped value.
    ///
    /// Callers must not pass the result into a logging or error-formatting
    /// call; use this only to feed the value into a crypto primitive.
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper, returning the inner value.
    pub fn into_inner(mut self) -> T {
        std::mem::replace(&mut self.0, zeroed_default(&self.0))
    }
}

/// Produce a zeroed placeholder of the same shape as `sample`, for moving
/// the real value out of a `Secret` without leaving a copy behind.
fn zeroed_default<T: Zeroize + Clone>(sample: &T) -> T {
    let mut placeholder = sample.clone();
    placeholder.zeroize();
    placeholder
}

impl<T: Zeroize + Clone> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..redacted..)")
    }
}

impl<T: Zeroize + Clone> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[redacted]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_never_leak() {
        let secret = Secret::new(String::from("do-not-print-me"));
        assert_eq!(format!("{secret:?}"), "Secret(..redacted..)");
        assert_eq!(format!("{secret}"), "[redacted]");
    }

    #[test]
    fn expose_returns_the_real_value() {
        let secret = Secret::new(String::from("value"));
        assert_eq!(secret.expose(), "value");
    }
}
