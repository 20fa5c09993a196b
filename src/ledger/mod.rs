//! Ledger module
//!
//! The store seams this service depends on: identifier links, account
//! provisioning and the atomic transfer operation.
//! `PgStore` is the production backend; `InMemoryStore` backs tests and local runs.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::crypto::SealedIdentifier;
use crate::domain::{Balance, IdentifierKind, TransferCompleted, TransferIntent};

pub use error::{LedgerError, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Lookup tables keyed by sealed identifiers
#[async_trait]
pub trait LinkDirectory: Send + Sync {
    /// Account currently linked to the sealed identifier, if any
    async fn find_account(
        &self,
        kind: IdentifierKind,
        sealed: &SealedIdentifier,
    ) -> Result<Option<Uuid>, StoreError>;
}

/// Account provisioning writes
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Insert an account. Returns false if the account id already existed
    /// (the existing row is left untouched).
    async fn create_account(&self, account: &AccountRecord) -> Result<bool, StoreError>;

    /// Link a card to an account, replacing any previous link of that card
    async fn link_card(&self, card: &SealedIdentifier, account_id: Uuid) -> Result<(), StoreError>;

    /// Link a phone to an account, replacing any previous link of that phone
    async fn link_phone(
        &self,
        phone: &SealedIdentifier,
        account_id: Uuid,
    ) -> Result<(), StoreError>;

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>, StoreError>;
}

/// The atomic transfer operation
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Verify ownership, move funds, record the transfer and its pending
    /// outbox event, all in one unit. Idempotent on `intent.transfer_id`.
    async fn process_transfer(&self, intent: &TransferIntent) -> Result<CommitReceipt, LedgerError>;
}

/// Account row as stored; identifiers are already sealed
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub account_id: Uuid,
    pub user_id: Uuid,
    pub account_number: SealedIdentifier,
    pub phone_number: SealedIdentifier,
    pub currency: String,
    pub balance: Balance,
}

/// Result of a committed (or previously committed) transfer
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub event: TransferCompleted,
    /// True if the transfer id had already been committed with the same fields
    pub replayed: bool,
}
