//! Maps every component's error vocabulary onto the one wire shape the
//! caller sees, the way [`pincer_registry::error`]'s module doc says this
//! crate should: registry and vault errors stay in their own enums, and it
//! is this crate's job to fold each variant onto a stable [`ErrorKind`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use pincer_error::{ApiError, ErrorKind};
use pincer_registry::RegistryError;
use pincer_vault::VaultError;

/// Newtype so this crate can impl [`IntoResponse`] for `pincer_error`'s
/// otherwise-foreign [`ApiError`].
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        AppError(err)
    }
}

impl From<ErrorKind> for AppError {
    fn from(kind: ErrorKind) -> Self {
        AppError(ApiError::new(kind))
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError(map_registry_error(err))
    }
}

impl From<VaultError> for AppError {
    fn from(err: VaultError) -> Self {
        AppError(map_vault_error(err))
    }
}

/// Fold a [`RegistryError`] onto the stable kind the caller sees.
pub fn map_registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::InvalidManifest(details) => {
            ApiError::new(ErrorKind::InvalidManifest).with_details(details)
        }
        RegistryError::InvalidApplyRequest => ApiError::new(ErrorKind::InvalidPayload),
        RegistryError::ProposalNotFound(id) => {
            ApiError::new(ErrorKind::ProposalNotFound).with_details(vec![id])
        }
        RegistryError::AdapterNotFound(id) => {
            ApiError::new(ErrorKind::AdapterNotFound).with_details(vec![id])
        }
        RegistryError::RevisionOutdated { active, requested } => {
            ApiError::new(ErrorKind::RevisionOutdated)
                .with_details(vec![format!("active revision {active}, requested {requested}")])
        }
        RegistryError::RevisionConflict(revision) => ApiError::new(ErrorKind::RevisionConflict)
            .with_details(vec![format!("revision {revision} is active with different content")]),
        RegistryError::MissingRequiredSecrets(missing) => {
            ApiError::new(ErrorKind::MissingRequiredSecrets).with_missing_secrets(missing)
        }
        RegistryError::Vault(vault_err) => map_vault_error(vault_err),
        RegistryError::Kv(kv_err) => internal(kv_err),
        RegistryError::Corrupt(json_err) => internal(json_err),
    }
}

/// Fold a [`VaultError`] onto the stable kind the caller sees.
pub fn map_vault_error(err: VaultError) -> ApiError {
    match err {
        VaultError::InvalidBinding(binding) => {
            ApiError::new(ErrorKind::InvalidSecretValue).with_details(vec![binding])
        }
        VaultError::EmptyValue => ApiError::new(ErrorKind::InvalidSecretValue),
        VaultError::Kv(kv_err) => internal(kv_err),
    }
}

/// Build an `internal_error`, redacting anything that looks like it names a
/// secret before the message leaves the boundary.
fn internal(err: impl std::fmt::Display) -> ApiError {
    let message = ApiError::redact_message(&err.to_string()).into_owned();
    ApiError::new(ErrorKind::InternalError).with_details(vec![message])
}
