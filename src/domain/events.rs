//! Domain Events
//!
//! Events are immutable facts that have happened in the system.
//! A `TransferCompleted` event exists only for transfers the ledger committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::TransferIntent;

/// Events published on the transaction events exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransactionEvent {
    TransferCompleted(TransferCompleted),
}

impl TransactionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TransactionEvent::TransferCompleted(_) => "TransferCompleted",
        }
    }

    /// Get the transfer ID this event relates to
    pub fn transfer_id(&self) -> Uuid {
        match self {
            TransactionEvent::TransferCompleted(e) => e.transfer_id,
        }
    }

    /// Identifier consumers use for deduplication
    pub fn delivery_id(&self) -> &str {
        match self {
            TransactionEvent::TransferCompleted(e) => &e.delivery_id,
        }
    }
}

/// A committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCompleted {
    pub transfer_id: Uuid,
    pub sender_id: Uuid,
    pub sender_account_id: Uuid,
    pub receiver_account_id: Uuid,
    /// Minor units
    pub amount: u64,
    pub committed_at: DateTime<Utc>,
    /// SHA-256 over the committed fields, hex encoded
    pub delivery_id: String,
}

impl TransferCompleted {
    /// Build the event for a committed transfer.
    pub fn new(
        transfer_id: Uuid,
        sender_id: Uuid,
        sender_account_id: Uuid,
        receiver_account_id: Uuid,
        amount: u64,
        committed_at: DateTime<Utc>,
    ) -> Self {
        let delivery_id = delivery_id(
            transfer_id,
            sender_id,
            sender_account_id,
            receiver_account_id,
            amount,
        );
        Self {
            transfer_id,
            sender_id,
            sender_account_id,
            receiver_account_id,
            amount,
            committed_at,
            delivery_id,
        }
    }

    pub fn from_intent(intent: &TransferIntent, committed_at: DateTime<Utc>) -> Self {
        Self::new(
            intent.transfer_id,
            intent.sender_id,
            intent.sender_account_id,
            intent.receiver_account_id,
            intent.amount.minor_units(),
            committed_at,
        )
    }

    /// Check that the delivery id matches the committed fields
    pub fn verify_delivery_id(&self) -> bool {
        self.delivery_id
            == delivery_id(
                self.transfer_id,
                self.sender_id,
                self.sender_account_id,
                self.receiver_account_id,
                self.amount,
            )
    }
}

impl From<TransferCompleted> for TransactionEvent {
    fn from(event: TransferCompleted) -> Self {
        TransactionEvent::TransferCompleted(event)
    }
}

/// Content address of a transfer. The commit timestamp is left out so that a
/// replayed commit yields the same id.
fn delivery_id(
    transfer_id: Uuid,
    sender_id: Uuid,
    sender_account_id: Uuid,
    receiver_account_id: Uuid,
    amount: u64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transfer_id.as_bytes());
    hasher.update(sender_id.as_bytes());
    hasher.update(sender_account_id.as_bytes());
    hasher.update(receiver_account_id.as_bytes());
    hasher.update(amount.to_be_bytes());
    hex::encode(hasher.finalize())
}
