//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::TransferError;
use crate::handlers::ProvisioningError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    // Transfer outcomes
    #[error(transparent)]
    Transfer(#[from] TransferError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<ProvisioningError> for AppError {
    fn from(e: ProvisioningError) -> Self {
        match e {
            ProvisioningError::Invalid(msg) => AppError::InvalidRequest(msg),
            ProvisioningError::AccountNotFound(id) => AppError::AccountNotFound(id.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidHeader(header) => {
                (StatusCode::BAD_REQUEST, "invalid_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::MissingHeader(header) => {
                (StatusCode::UNAUTHORIZED, "missing_identity", Some(header.clone()))
            }

            // 404 Not Found
            AppError::AccountNotFound(id) => {
                (StatusCode::NOT_FOUND, "account_not_found", Some(id.clone()))
            }

            // Transfer outcomes - map each category to its HTTP status
            AppError::Transfer(transfer_err) => match transfer_err {
                TransferError::Invalid(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
                }
                TransferError::NotFound(kind) => {
                    (StatusCode::NOT_FOUND, "recipient_not_found", Some(kind.to_string()))
                }
                TransferError::Unauthenticated => {
                    (StatusCode::UNAUTHORIZED, "missing_identity", None)
                }
                TransferError::Unauthorized(_) => {
                    (StatusCode::FORBIDDEN, "unauthorized_transfer", None)
                }
                TransferError::InsufficientFunds { .. } => {
                    (StatusCode::BAD_REQUEST, "insufficient_funds", None)
                }
                TransferError::Conflict { transfer_id } => (
                    StatusCode::CONFLICT,
                    "transfer_conflict",
                    Some(transfer_id.to_string()),
                ),
                TransferError::ReceiverNotFound(_) => {
                    tracing::error!(error = %transfer_err, "Resolved receiver vanished");
                    (StatusCode::INTERNAL_SERVER_ERROR, "receiver_not_found", None)
                }
                TransferError::Unavailable(msg) => {
                    tracing::error!("Service unavailable: {}", msg);
                    (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", None)
                }
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        // Server-side detail stays in the logs
        let error = if status.is_server_error() {
            match &self {
                AppError::Transfer(TransferError::Unavailable(_)) => {
                    "Service temporarily unavailable".to_string()
                }
                _ => "Transaction failed".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
