//! Ledger Errors
//!
//! Error types for store and transfer operations.

use uuid::Uuid;

use crate::domain::TransferError;

/// Errors from plain store reads and writes
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store unreachable (used by non-SQL backends)
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Referenced account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    /// A unique identifier is already taken by another account
    #[error("Duplicate {0}")]
    Duplicate(&'static str),

    /// Persisted row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Corrupt(e.to_string())
    }
}

/// Errors from the atomic transfer operation
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// Sender account missing or owned by someone else
    #[error("Caller does not own account {sender_account_id}")]
    Unauthorized { sender_account_id: Uuid },

    #[error("Receiver account not found: {0}")]
    ReceiverNotFound(Uuid),

    /// Transfer id already committed with different parameters
    #[error("Transfer {transfer_id} conflicts with an existing transfer")]
    Conflict { transfer_id: Uuid },

    /// Transient failure; the transfer may or may not have committed
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Check if the operation may be retried with the same transfer id
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

impl From<LedgerError> for TransferError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds {
                required,
                available,
            } => TransferError::InsufficientFunds {
                required,
                available,
            },
            LedgerError::Unauthorized { .. } => {
                TransferError::Unauthorized("caller does not own the sender account".to_string())
            }
            LedgerError::ReceiverNotFound(id) => TransferError::ReceiverNotFound(id),
            LedgerError::Conflict { transfer_id } => TransferError::Conflict { transfer_id },
            LedgerError::Unavailable(msg) => TransferError::Unavailable(msg),
        }
    }
}
