use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use crmvault_core::api::ErrorResponse;
use crmvault_core::{AuthError, StorageError, VaultError};

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("Invalid or expired download signature")]
    InvalidSignature,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::NotFound { bucket, path } => {
                ApiError::NotFound(format!("Object not found: {}/{}", bucket, path))
            }
            StorageError::InvalidPath { path } => {
                ApiError::BadRequest(format!("Invalid path: {}", path))
            }
            other => ApiError::Vault(other.into()),
        }
    }
}

impl ApiError {
    /// Status code a failure is reported with
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Vault(error) => vault_status(error.root()),
            ApiError::InvalidSignature => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

fn vault_status(error: &VaultError) -> StatusCode {
    match error {
        VaultError::Validation { .. } => StatusCode::BAD_REQUEST,
        VaultError::Auth(AuthError::MissingCredential | AuthError::InvalidCredential) => {
            StatusCode::UNAUTHORIZED
        }
        VaultError::Auth(AuthError::Forbidden { .. }) => StatusCode::FORBIDDEN,
        VaultError::NotFound { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let job_id = match &self {
            ApiError::Vault(error) => error.job_id(),
            _ => None,
        };

        if status.is_server_error() {
            tracing::error!(job_id = ?job_id, "Request failed: {self:#}");
        } else {
            tracing::debug!(status = %status, "Request rejected: {self}");
        }

        (status, Json(ErrorResponse::new(self.to_string(), job_id))).into_response()
    }
}
