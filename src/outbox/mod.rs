//! Outbox module
//!
//! Durable pending-publish markers. The ledger writes one entry per committed
//! transfer inside the commit transaction; an entry stays pending until the
//! event has been accepted by the broker for every bound queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::TransactionEvent;
use crate::ledger::StoreError;

/// Outbox entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Published,
}

impl From<String> for OutboxStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "published" => OutboxStatus::Published,
            _ => OutboxStatus::Pending,
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboxStatus::Pending => write!(f, "pending"),
            OutboxStatus::Published => write!(f, "published"),
        }
    }
}

/// A stored outbox entry
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub transfer_id: Uuid,
    pub event: TransactionEvent,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait Outbox: Send + Sync {
    /// Pending entries in commit order
    async fn pending(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError>;

    /// Look up the entry of one transfer
    async fn get(&self, transfer_id: Uuid) -> Result<Option<OutboxEntry>, StoreError>;

    async fn mark_published(&self, transfer_id: Uuid) -> Result<(), StoreError>;

    /// Count a failed publish attempt and keep the entry pending
    async fn record_failure(&self, transfer_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Delete published entries older than `cutoff`
    async fn purge_published(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
