//! In-memory ledger store
//!
//! Same semantics as the PostgreSQL store, kept in process memory. Used by
//! the test suite and for running the service without a database. A few
//! hooks let tests simulate an unreachable or slow store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::crypto::SealedIdentifier;
use crate::domain::{Balance, IdentifierKind, TransactionEvent, TransferCompleted, TransferIntent};
use crate::outbox::{Outbox, OutboxEntry, OutboxStatus};

use super::{
    AccountDirectory, AccountRecord, CommitReceipt, Ledger, LedgerError, LinkDirectory, StoreError,
};

#[derive(Debug, Clone)]
struct StoredTransfer {
    sender_id: Uuid,
    sender_account_id: Uuid,
    receiver_account_id: Uuid,
    amount: u64,
    committed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredOutbox {
    entry: OutboxEntry,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Uuid, AccountRecord>,
    cards: HashMap<SealedIdentifier, Uuid>,
    phones: HashMap<SealedIdentifier, Uuid>,
    transfers: HashMap<Uuid, StoredTransfer>,
    /// Insertion order is commit order
    outbox: Vec<StoredOutbox>,
}

/// In-memory store implementing every store trait
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    transfer_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the database were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every subsequent transfer by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of `process_transfer` calls received
    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    /// Number of `find_account` calls received
    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Number of committed transfers
    pub async fn transfer_count(&self) -> usize {
        self.state.lock().await.transfers.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        let millis = self.latency_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}

#[async_trait]
impl LinkDirectory for InMemoryStore {
    async fn find_account(
        &self,
        kind: IdentifierKind,
        sealed: &SealedIdentifier,
    ) -> Result<Option<Uuid>, StoreError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let state = self.state.lock().await;
        let found = match kind {
            IdentifierKind::Card => state.cards.get(sealed).copied(),
            IdentifierKind::Phone => state.phones.get(sealed).copied(),
            IdentifierKind::AccountNumber => state
                .accounts
                .values()
                .find(|a| &a.account_number == sealed)
                .map(|a| a.account_id),
        };
        Ok(found)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryStore {
    async fn create_account(&self, account: &AccountRecord) -> Result<bool, StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&account.account_id) {
            return Ok(false);
        }
        if state
            .accounts
            .values()
            .any(|a| a.account_number == account.account_number)
        {
            return Err(StoreError::Duplicate("account number"));
        }
        state.accounts.insert(account.account_id, account.clone());
        Ok(true)
    }

    async fn link_card(&self, card: &SealedIdentifier, account_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(StoreError::AccountNotFound(account_id));
        }
        state.cards.insert(card.clone(), account_id);
        Ok(())
    }

    async fn link_phone(
        &self,
        phone: &SealedIdentifier,
        account_id: Uuid,
    ) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(StoreError::AccountNotFound(account_id));
        }
        state.phones.insert(phone.clone(), account_id);
        Ok(())
    }

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>, StoreError> {
        self.check_available()?;

        let state = self.state.lock().await;
        Ok(state.accounts.get(&account_id).map(|a| a.balance))
    }
}

#[async_trait]
impl Ledger for InMemoryStore {
    async fn process_transfer(&self, intent: &TransferIntent) -> Result<CommitReceipt, LedgerError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_available()?;

        let mut state = self.state.lock().await;

        if let Some(existing) = state.transfers.get(&intent.transfer_id) {
            if !intent.same_movement(
                existing.sender_id,
                existing.sender_account_id,
                existing.receiver_account_id,
                existing.amount,
            ) {
                return Err(LedgerError::Conflict {
                    transfer_id: intent.transfer_id,
                });
            }
            return Ok(CommitReceipt {
                event: TransferCompleted::new(
                    intent.transfer_id,
                    existing.sender_id,
                    existing.sender_account_id,
                    existing.receiver_account_id,
                    existing.amount,
                    existing.committed_at,
                ),
                replayed: true,
            });
        }

        let sender_balance = state
            .accounts
            .get(&intent.sender_account_id)
            .filter(|a| a.user_id == intent.sender_id)
            .map(|a| a.balance)
            .ok_or(LedgerError::Unauthorized {
                sender_account_id: intent.sender_account_id,
            })?;

        let receiver_balance = state
            .accounts
            .get(&intent.receiver_account_id)
            .map(|a| a.balance)
            .ok_or(LedgerError::ReceiverNotFound(intent.receiver_account_id))?;

        if !sender_balance.is_sufficient_for(&intent.amount) {
            return Err(LedgerError::InsufficientFunds {
                required: intent.amount.minor_units(),
                available: sender_balance.minor_units(),
            });
        }

        // Compute both new balances before mutating anything
        let debited = sender_balance
            .debit(&intent.amount)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        let credited = receiver_balance
            .credit(&intent.amount)
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        if let Some(sender) = state.accounts.get_mut(&intent.sender_account_id) {
            sender.balance = debited;
        }
        if let Some(receiver) = state.accounts.get_mut(&intent.receiver_account_id) {
            receiver.balance = credited;
        }

        let committed_at = Utc::now();
        state.transfers.insert(
            intent.transfer_id,
            StoredTransfer {
                sender_id: intent.sender_id,
                sender_account_id: intent.sender_account_id,
                receiver_account_id: intent.receiver_account_id,
                amount: intent.amount.minor_units(),
                committed_at,
            },
        );

        let event = TransferCompleted::from_intent(intent, committed_at);
        state.outbox.push(StoredOutbox {
            entry: OutboxEntry {
                transfer_id: intent.transfer_id,
                event: TransactionEvent::from(event.clone()),
                status: OutboxStatus::Pending,
                attempts: 0,
                last_error: None,
                created_at: committed_at,
            },
            published_at: None,
        });

        Ok(CommitReceipt {
            event,
            replayed: false,
        })
    }
}

#[async_trait]
impl Outbox for InMemoryStore {
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError> {
        self.check_available()?;

        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|o| o.entry.status == OutboxStatus::Pending)
            .take(limit.max(0) as usize)
            .map(|o| o.entry.clone())
            .collect())
    }

    async fn get(&self, transfer_id: Uuid) -> Result<Option<OutboxEntry>, StoreError> {
        self.check_available()?;

        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .find(|o| o.entry.transfer_id == transfer_id)
            .map(|o| o.entry.clone()))
    }

    async fn mark_published(&self, transfer_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        if let Some(o) = state
            .outbox
            .iter_mut()
            .find(|o| o.entry.transfer_id == transfer_id)
        {
            o.entry.status = OutboxStatus::Published;
            o.published_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_failure(&self, transfer_id: Uuid, error: &str) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        if let Some(o) = state
            .outbox
            .iter_mut()
            .find(|o| o.entry.transfer_id == transfer_id && o.entry.status == OutboxStatus::Pending)
        {
            o.entry.attempts += 1;
            o.entry.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn purge_published(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_available()?;

        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|o| !matches!(o.published_at, Some(at) if at < cutoff));
        Ok((before - state.outbox.len()) as u64)
    }
}
