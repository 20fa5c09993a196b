//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;
use uuid::Uuid;

use super::IdentifierKind;

/// Outcome categories of a rejected or failed transfer.
///
/// Component errors (resolution, building, execution) convert into this
/// taxonomy; the HTTP boundary only needs to look at this type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// Malformed or missing request fields, non-positive amount
    #[error("Invalid transfer request: {0}")]
    Invalid(String),

    /// No account is linked to the recipient identifier
    #[error("No account linked to {0}")]
    NotFound(IdentifierKind),

    /// No caller identity accompanied the request
    #[error("Missing caller identity")]
    Unauthenticated,

    /// Caller does not own the claimed sender account
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Sender balance is lower than the amount
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// Receiver account vanished between resolution and execution
    #[error("Receiver account not found: {0}")]
    ReceiverNotFound(Uuid),

    /// Same transfer id was committed with different parameters
    #[error("Transfer {transfer_id} already exists with different parameters")]
    Conflict { transfer_id: Uuid },

    /// Store unreachable or timed out; the outcome of the operation is unknown
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl TransferError {
    /// Check if this is a client error (caller's fault, 4xx)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Unavailable(_) | Self::ReceiverNotFound(_))
    }

    /// Check if the caller may retry with the same transfer id
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
