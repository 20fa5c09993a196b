//! Broker module
//!
//! Durable fanout messaging: exchanges broadcast every published message to
//! each bound queue, and each queue is drained by one consumer role.
//!
//! `PgBroker` keeps queues in PostgreSQL; `InMemoryBroker` backs tests.

mod error;
mod memory;
mod postgres;
mod publisher;
mod topology;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::BrokerError;
pub use memory::InMemoryBroker;
pub use postgres::PgBroker;
pub use publisher::{PublishError, TransferEventPublisher, DEFAULT_PUBLISH_TIMEOUT};
pub use topology::{DeclaredTopology, FanoutTopology, DEFAULT_EXCHANGE, DEFAULT_QUEUES};

/// Message handed to an exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Producer-assigned id, stable across re-publishes of the same event
    pub message_id: String,
    pub payload: serde_json::Value,
}

/// Message leased from a queue
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Queue-local handle used to ack this delivery
    pub delivery_tag: i64,
    pub message_id: String,
    pub payload: serde_json::Value,
    /// True if the message was leased before and not acked
    pub redelivered: bool,
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a durable fanout exchange. Idempotent.
    async fn declare_exchange(&self, exchange: &str) -> Result<(), BrokerError>;

    /// Declare a durable queue. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Bind `queue` to `exchange`. Idempotent.
    async fn bind_queue(&self, queue: &str, exchange: &str) -> Result<(), BrokerError>;

    /// Durably enqueue `message` on every queue bound to `exchange`.
    ///
    /// Returns the number of queues the message was enqueued on; either all
    /// bound queues receive it or none does.
    async fn publish(&self, exchange: &str, message: &BrokerMessage) -> Result<usize, BrokerError>;

    /// Lease up to `max` messages in FIFO order. Leased messages are hidden
    /// from other fetches for `visibility` and redelivered if not acked.
    async fn fetch(
        &self,
        queue: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, BrokerError>;

    /// Remove an acknowledged delivery
    async fn ack(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError>;

    /// Drop the lease on an unacked delivery so the next fetch returns it
    async fn release(&self, queue: &str, delivery_tag: i64) -> Result<(), BrokerError>;
}
