//! Transfer Intent
//!
//! The validated, resolved form of a transfer request. Built once per request
//! and consumed once by the executor; never persisted directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, IdentifierKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIntent {
    /// Minted by the builder before execution; doubles as the idempotency key
    pub transfer_id: Uuid,
    /// Authenticated caller
    pub sender_id: Uuid,
    /// Advisory; ownership is verified by the ledger's atomic operation
    pub sender_account_id: Uuid,
    pub receiver_account_id: Uuid,
    pub amount: Amount,
    /// How the receiver was addressed (never the raw identifier itself)
    pub receiver_kind: IdentifierKind,
    pub correlation_id: Option<Uuid>,
}

impl TransferIntent {
    /// True if `other` describes the same money movement.
    ///
    /// Used for idempotent replays: only the committed fields are compared.
    pub fn same_movement(
        &self,
        sender_id: Uuid,
        sender_account_id: Uuid,
        receiver_account_id: Uuid,
        amount: u64,
    ) -> bool {
        self.sender_id == sender_id
            && self.sender_account_id == sender_account_id
            && self.receiver_account_id == receiver_account_id
            && self.amount.minor_units() == amount
    }
}
