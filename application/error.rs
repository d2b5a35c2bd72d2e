use axum::http::header::{ACCEPT, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::AuthRejection;
use crate::repository::CredentialError;
use crate::storage::{SpoolError, StorageError};
use crate::validator::ValidationError;

pub const GEM_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidPackage(#[from] ValidationError),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("authorization required")]
    AuthRequired { realm: String },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },
    #[error("the gem was stored but the index could not be regenerated")]
    IndexStale,
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
    #[error("unexpected error")]
    Other(String),
}

impl AppError {
    pub fn from_rejection(rejection: AuthRejection, realm: &str) -> Self {
        match rejection {
            AuthRejection::AuthRequired => Self::AuthRequired {
                realm: realm.to_string(),
            },
            AuthRejection::BadRequest(detail) => Self::BadRequest(detail),
            AuthRejection::Backend(err) => err.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let detail = &self.to_string();
        let status_code = match &self {
            AppError::InvalidPackage(ValidationError::MalformedPackage(_)) => {
                StatusCode::NOT_ACCEPTABLE
            }
            AppError::InvalidPackage(ValidationError::CorruptPackage(_)) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) => StatusCode::FORBIDDEN,
            AppError::AuthRequired { .. } => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::IndexStale => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = json!({ "errors": [{ "detail": detail }] });
        let mut response = (status_code, Json(payload)).into_response();

        match &self {
            AppError::InvalidPackage(ValidationError::MalformedPackage(_)) => {
                response
                    .headers_mut()
                    .insert(ACCEPT, HeaderValue::from_static(GEM_CONTENT_TYPE));
            }
            AppError::AuthRequired { realm } => {
                let challenge = HeaderValue::from_str(&format!("Basic realm=\"{realm}\""))
                    .unwrap_or_else(|_| HeaderValue::from_static("Basic"));
                response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
            }
            _ => {}
        }

        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::AlreadyExists(key) => Self::AlreadyExists(key),
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::InvalidKey(key) => Self::BadRequest(format!("invalid file name {key}")),
            StorageError::Io(err) => {
                let error_message = err.to_string();
                let error_type = "storage_io".to_string();
                error!(error_message, error_type, "unexpected error");
                Self::Other(error_message)
            }
        }
    }
}

impl From<SpoolError> for AppError {
    fn from(err: SpoolError) -> Self {
        match err {
            SpoolError::TooLarge { limit } => Self::PayloadTooLarge { limit },
            SpoolError::Body(detail) => Self::BadRequest(detail),
            SpoolError::Io(err) => {
                let error_message = err.to_string();
                let error_type = "spool_io".to_string();
                error!(error_message, error_type, "unexpected error");
                Self::Other(error_message)
            }
        }
    }
}

impl From<CredentialError> for AppError {
    fn from(err: CredentialError) -> Self {
        let error_message = err.to_string();
        let error_type = "credential_store".to_string();
        error!(error_message, error_type, "unexpected error");
        Self::Other(error_message)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        let error_message = err.to_string();
        let error_type = "task_join".to_string();
        error!(error_message, error_type, "unexpected error");
        Self::Other(error_message)
    }
}

pub type AppResult<T> = Result<T, AppError>;
