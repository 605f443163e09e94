//! Registry-specific errors.
//!
//! These stay in the registry's own vocabulary; `pincer-server` maps each
//! variant onto the stable `pincer_error::ErrorKind` the caller sees.

/// Errors raised by [`crate::Registry`] operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// The underlying KV store failed.
    #[error(transparent)]
    Kv(#[from] pincer_kv::KvError),
    /// The underlying vault failed while resolving a required secret.
    #[error(transparent)]
    Vault(#[from] pincer_vault::VaultError),
    /// A submitted or applied manifest failed validation.
    #[error("manifest failed validation")]
    InvalidManifest(Vec<String>),
    /// `apply` was called with neither or both of `proposalId`/`manifest`.
    #[error("apply requires exactly one of proposalId or manifest")]
    InvalidApplyRequest,
    /// No proposal exists with the given id.
    #[error("proposal {0:?} not found")]
    ProposalNotFound(String),
    /// No active adapter exists with the given id.
    #[error("adapter {0:?} not found")]
    AdapterNotFound(String),
    /// The applied revision is older than the currently active one.
    #[error("revision {requested} is older than active revision {active}")]
    RevisionOutdated {
        /// The revision currently active.
        active: u64,
        /// The revision the caller attempted to apply.
        requested: u64,
    },
    /// The applied revision matches the active one but its content differs.
    #[error("revision {0} is active but the applied content differs")]
    RevisionConflict(u64),
    /// One or more of the manifest's required secrets failed to resolve.
    #[error("required secrets are unresolved: {0:?}")]
    MissingRequiredSecrets(Vec<String>),
    /// A stored record could not be parsed back into its expected shape.
    #[error("stored registry record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, RegistryError>;
