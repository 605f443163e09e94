//! Error types for `fs-mistrust`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An error type for this crate.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An IO error occurred while inspecting a filesystem object.
    #[error("unable to inspect {1:?}")]
    Io(#[source] Arc<std::io::Error>, PathBuf),

    /// An object was not of the type we expected (file vs directory).
    #[error("{0:?} was not of the expected type")]
    BadType(PathBuf),

    /// An object was owned by a user we do not trust.
    #[error("{0:?} was owned by unexpected user {1}")]
    BadOwner(PathBuf, u32),

    /// An object had permission bits set that would let an untrusted user
    /// read or write it.
    #[error("{0:?} had forbidden permission bits set: {1:#o}")]
    BadPermission(PathBuf, u32),

    /// More than one error was found while checking a path.
    #[error("multiple errors: {0:?}")]
    Multiple(Vec<Error>),
}

impl Error {
    /// Construct an [`Error::Io`] from an underlying IO error and the path
    /// that was being inspected when it happened.
    pub(crate) fn inspecting(err: std::io::Error, path: impl AsRef<Path>) -> Error {
        Error::Io(Arc::new(err), path.as_ref().into())
    }

    /// Return the path associated with this error, if there is a unique one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Io(_, p) | Error::BadType(p) | Error::BadOwner(p, _) | Error::BadPermission(p, _) => {
                Some(p.as_path())
            }
            Error::Multiple(_) => None,
        }
    }

    /// Return an iterator over the individual errors contained in `self`.
    ///
    /// For any error other than [`Error::Multiple`], this iterator yields
    /// just `self`.
    pub fn errors(&self) -> Box<dyn Iterator<Item = &Error> + '_> {
        match self {
            Error::Multiple(errs) => Box::new(errs.iter()),
            other => Box::new(std::iter::once(other)),
        }
    }
}

impl FromIterator<Error> for Option<Error> {
    fn from_iter<T: IntoIterator<Item = Error>>(iter: T) -> Self {
        let mut errors: Vec<Error> = iter.into_iter().collect();
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }
}
