//! Error types for the server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::error::HybridError;

/// Machine-readable error class, sent as `kind` next to the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingFile,
    EmptyFilename,
    UnsupportedFormat,
    EmptyDataset,
    NoTargetColumn,
    InvalidRequest,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    Timeout,
    Internal,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Analysis timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Pipeline(#[from] HybridError),

    #[error("{0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServerError::MissingFile => ErrorKind::MissingFile,
            ServerError::EmptyFilename => ErrorKind::EmptyFilename,
            ServerError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ServerError::NotFound(_) => ErrorKind::NotFound,
            ServerError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            ServerError::Timeout(_) => ErrorKind::Timeout,
            ServerError::Pipeline(e) => match e {
                HybridError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
                HybridError::EmptyDataset => ErrorKind::EmptyDataset,
                HybridError::NoTargetColumn => ErrorKind::NoTargetColumn,
                _ => ErrorKind::Internal,
            },
            ServerError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::MissingFile
            | ErrorKind::EmptyFilename
            | ErrorKind::UnsupportedFormat
            | ErrorKind::EmptyDataset
            | ErrorKind::NoTargetColumn
            | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Timeout | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{error, kind}` response body
pub fn error_body(status: StatusCode, kind: ErrorKind, message: &str) -> Response {
    (status, Json(json!({ "error": message, "kind": kind }))).into_response()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(kind = ?self.kind(), detail = %message, "Request failed");
        } else {
            tracing::debug!(kind = ?self.kind(), detail = %message, "Request rejected");
        }
        error_body(status, self.kind(), &message)
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
