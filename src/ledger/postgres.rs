//! PostgreSQL ledger store
//!
//! Implements the link lookups, provisioning writes, the atomic transfer and
//! the transfer outbox on one connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::crypto::SealedIdentifier;
use crate::domain::{Balance, IdentifierKind, TransactionEvent, TransferCompleted, TransferIntent};
use crate::outbox::{Outbox, OutboxEntry, OutboxStatus};

use super::{
    AccountDirectory, AccountRecord, CommitReceipt, Ledger, LedgerError, LinkDirectory, StoreError,
};

/// Postgres error code for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// Postgres error code for foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Attempts when a concurrent insert of the same transfer id wins the race
const MAX_COMMIT_ATTEMPTS: u32 = 2;

type OutboxRow = (
    Uuid,
    serde_json::Value,
    String,
    i32,
    Option<String>,
    DateTime<Utc>,
);

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Single attempt of the atomic transfer. `Ok(None)` means a concurrent
    /// commit of the same transfer id won the insert race.
    async fn try_process_transfer(
        &self,
        intent: &TransferIntent,
    ) -> Result<Option<CommitReceipt>, LedgerError> {
        let mut tx = self.pool.begin().await?;

        // Lock both accounts in a stable order so concurrent transfers between
        // the same pair cannot deadlock. Requests reusing a transfer id queue
        // up here, so the idempotency check below sees the committed row.
        let mut ids = vec![intent.sender_account_id, intent.receiver_account_id];
        ids.sort();
        ids.dedup();

        let accounts: Vec<(Uuid, Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT account_id, user_id, balance
            FROM accounts
            WHERE account_id = ANY($1)
            ORDER BY account_id
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(receipt) = self.check_existing_transfer(&mut tx, intent).await? {
            tx.rollback().await?;
            return Ok(Some(receipt));
        }

        let sender = accounts
            .iter()
            .find(|(id, _, _)| *id == intent.sender_account_id)
            .filter(|(_, owner, _)| *owner == intent.sender_id)
            .ok_or(LedgerError::Unauthorized {
                sender_account_id: intent.sender_account_id,
            })?;

        if !accounts
            .iter()
            .any(|(id, _, _)| *id == intent.receiver_account_id)
        {
            return Err(LedgerError::ReceiverNotFound(intent.receiver_account_id));
        }

        let available = u64::try_from(sender.2).unwrap_or(0);
        if available < intent.amount.minor_units() {
            return Err(LedgerError::InsufficientFunds {
                required: intent.amount.minor_units(),
                available,
            });
        }

        sqlx::query("UPDATE accounts SET balance = balance - $2 WHERE account_id = $1")
            .bind(intent.sender_account_id)
            .bind(intent.amount.as_i64())
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE accounts SET balance = balance + $2 WHERE account_id = $1")
            .bind(intent.receiver_account_id)
            .bind(intent.amount.as_i64())
            .execute(&mut *tx)
            .await?;

        let inserted: Result<DateTime<Utc>, sqlx::Error> = sqlx::query_scalar(
            r#"
            INSERT INTO transfers (
                transfer_id, sender_id, sender_account_id,
                receiver_account_id, amount, correlation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING created_at
            "#,
        )
        .bind(intent.transfer_id)
        .bind(intent.sender_id)
        .bind(intent.sender_account_id)
        .bind(intent.receiver_account_id)
        .bind(intent.amount.as_i64())
        .bind(intent.correlation_id)
        .fetch_one(&mut *tx)
        .await;

        let committed_at = match inserted {
            Ok(at) => at,
            Err(e) if has_code(&e, UNIQUE_VIOLATION) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let event = TransferCompleted::from_intent(intent, committed_at);
        let payload = serde_json::to_value(TransactionEvent::from(event.clone()))
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO transfer_outbox (transfer_id, event, status)
            VALUES ($1, $2, 'pending')
            "#,
        )
        .bind(intent.transfer_id)
        .bind(payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(CommitReceipt {
            event,
            replayed: false,
        }))
    }

    /// Compare against a previously committed transfer with the same id
    async fn check_existing_transfer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        intent: &TransferIntent,
    ) -> Result<Option<CommitReceipt>, LedgerError> {
        let existing: Option<(Uuid, Uuid, Uuid, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT sender_id, sender_account_id, receiver_account_id, amount, created_at
            FROM transfers
            WHERE transfer_id = $1
            "#,
        )
        .bind(intent.transfer_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some((sender_id, sender_account_id, receiver_account_id, amount, created_at)) =
            existing
        else {
            return Ok(None);
        };

        let amount = u64::try_from(amount).unwrap_or(0);
        if !intent.same_movement(sender_id, sender_account_id, receiver_account_id, amount) {
            return Err(LedgerError::Conflict {
                transfer_id: intent.transfer_id,
            });
        }

        Ok(Some(CommitReceipt {
            event: TransferCompleted::new(
                intent.transfer_id,
                sender_id,
                sender_account_id,
                receiver_account_id,
                amount,
                created_at,
            ),
            replayed: true,
        }))
    }
}

fn has_code(e: &sqlx::Error, code: &str) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

fn link_error(e: sqlx::Error, account_id: Uuid) -> StoreError {
    if has_code(&e, FOREIGN_KEY_VIOLATION) {
        StoreError::AccountNotFound(account_id)
    } else {
        StoreError::Database(e)
    }
}

fn decode_outbox_row(row: OutboxRow) -> Result<OutboxEntry, StoreError> {
    let (transfer_id, event, status, attempts, last_error, created_at) = row;
    Ok(OutboxEntry {
        transfer_id,
        event: serde_json::from_value(event)?,
        status: OutboxStatus::from(status),
        attempts,
        last_error,
        created_at,
    })
}

#[async_trait]
impl LinkDirectory for PgStore {
    async fn find_account(
        &self,
        kind: IdentifierKind,
        sealed: &SealedIdentifier,
    ) -> Result<Option<Uuid>, StoreError> {
        let query = match kind {
            IdentifierKind::Card => "SELECT account_id FROM card_to_account WHERE card_number = $1",
            IdentifierKind::Phone => {
                "SELECT account_id FROM phone_to_account WHERE phone_number = $1"
            }
            IdentifierKind::AccountNumber => {
                "SELECT account_id FROM accounts WHERE account_number = $1"
            }
        };

        let account_id: Option<Uuid> = sqlx::query_scalar(query)
            .bind(sealed.as_bytes())
            .fetch_optional(&self.pool)
            .await?;

        Ok(account_id)
    }
}

#[async_trait]
impl AccountDirectory for PgStore {
    async fn create_account(&self, account: &AccountRecord) -> Result<bool, StoreError> {
        let balance = i64::try_from(account.balance.minor_units())
            .map_err(|_| StoreError::Corrupt("balance exceeds BIGINT".to_string()))?;

        let rows = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, user_id, account_number, phone_number, currency, balance)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account.account_id)
        .bind(account.user_id)
        .bind(account.account_number.as_bytes())
        .bind(account.phone_number.as_bytes())
        .bind(&account.currency)
        .bind(balance)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if has_code(&e, UNIQUE_VIOLATION) {
                StoreError::Duplicate("account number")
            } else {
                StoreError::Database(e)
            }
        })?
        .rows_affected();

        Ok(rows == 1)
    }

    async fn link_card(&self, card: &SealedIdentifier, account_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO card_to_account (card_number, account_id)
            VALUES ($1, $2)
            ON CONFLICT (card_number)
            DO UPDATE SET account_id = excluded.account_id
            "#,
        )
        .bind(card.as_bytes())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| link_error(e, account_id))?;

        Ok(())
    }

    async fn link_phone(
        &self,
        phone: &SealedIdentifier,
        account_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO phone_to_account (phone_number, account_id)
            VALUES ($1, $2)
            ON CONFLICT (phone_number)
            DO UPDATE SET account_id = excluded.account_id
            "#,
        )
        .bind(phone.as_bytes())
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| link_error(e, account_id))?;

        Ok(())
    }

    async fn balance(&self, account_id: Uuid) -> Result<Option<Balance>, StoreError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE account_id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        balance
            .map(|b| {
                u64::try_from(b)
                    .map(Balance::new)
                    .map_err(|_| StoreError::Corrupt(format!("negative balance on {}", account_id)))
            })
            .transpose()
    }
}

#[async_trait]
impl Ledger for PgStore {
    async fn process_transfer(&self, intent: &TransferIntent) -> Result<CommitReceipt, LedgerError> {
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            if let Some(receipt) = self.try_process_transfer(intent).await? {
                return Ok(receipt);
            }
            tracing::warn!(
                transfer_id = %intent.transfer_id,
                "Concurrent commit of the same transfer id, re-checking"
            );
        }

        Err(LedgerError::Unavailable(
            "maximum commit attempts exceeded".to_string(),
        ))
    }
}

#[async_trait]
impl Outbox for PgStore {
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT transfer_id, event, status, attempts, last_error, created_at
            FROM transfer_outbox
            WHERE status = 'pending'
            ORDER BY seq ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_outbox_row).collect()
    }

    async fn get(&self, transfer_id: Uuid) -> Result<Option<OutboxEntry>, StoreError> {
        let row: Option<OutboxRow> = sqlx::query_as(
            r#"
            SELECT transfer_id, event, status, attempts, last_error, created_at
            FROM transfer_outbox
            WHERE transfer_id = $1
            "#,
        )
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_outbox_row).transpose()
    }

    async fn mark_published(&self, transfer_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE transfer_outbox
            SET status = 'published', published_at = NOW()
            WHERE transfer_id = $1
            "#,
        )
        .bind(transfer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, transfer_id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE transfer_outbox
            SET attempts = attempts + 1, last_error = $2, last_attempt_at = NOW()
            WHERE transfer_id = $1 AND status = 'pending'
            "#,
        )
        .bind(transfer_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_published(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows = sqlx::query(
            r#"
            DELETE FROM transfer_outbox
            WHERE status = 'published' AND published_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows)
    }
}
