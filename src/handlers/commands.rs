//! Command definitions
//!
//! Commands carry the raw, unvalidated fields of an inbound request.
//! Handlers validate them; nothing here is trusted.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::RecipientIdentifier;

use super::TransferState;

// =========================================================================
// Transfer
// =========================================================================

/// Command to move funds to the account behind a recipient identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferCommand {
    /// Sender account id as sent by the caller (advisory until the ledger
    /// verifies ownership)
    pub sender_account_id: Option<String>,
    /// Recipient, addressed by card, phone or account number
    pub recipient: Option<RecipientIdentifier>,
    /// Amount in minor units
    pub amount: Option<u64>,
}

impl TransferCommand {
    pub fn new(sender_account_id: String, recipient: RecipientIdentifier, amount: u64) -> Self {
        Self {
            sender_account_id: Some(sender_account_id),
            recipient: Some(recipient),
            amount: Some(amount),
        }
    }
}

/// Outcome of an accepted transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferResult {
    pub transfer_id: Uuid,
    /// `Succeeded` or `PartiallyCompleted`
    pub state: TransferState,
    /// True if the transfer id had already been committed
    pub replayed: bool,
}

// =========================================================================
// Provisioning
// =========================================================================

/// Command to create an account and link its first card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub account_number: String,
    pub phone_number: String,
    pub currency: String,
    pub balance: u64,
    pub card_number: String,
}

/// Command to link a card to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCardCommand {
    pub card_number: String,
    pub account_id: Uuid,
}

/// Command to link a phone number to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkPhoneCommand {
    pub phone_number: String,
    pub account_id: Uuid,
}

/// Result of account creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAccountResult {
    pub account_id: Uuid,
    /// False if the account already existed and was left untouched
    pub created: bool,
}
