//! Fanout topology
//!
//! One exchange per event category and one queue per consumer role. The
//! topology has to be declared before a publisher can be built from it.

use std::sync::Arc;

use super::{Broker, BrokerError};

/// Exchange carrying transfer events
pub const DEFAULT_EXCHANGE: &str = "transaction_events";

/// Projection queues bound by default
pub const DEFAULT_QUEUES: &[&str] = &["postgres", "mongo"];

/// Topology definition, not yet applied to a broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutTopology {
    exchange: String,
    queues: Vec<String>,
}

impl FanoutTopology {
    pub fn new(exchange: impl Into<String>, queues: Vec<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queues,
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Declare the exchange and every queue, then bind them.
    ///
    /// All declarations are idempotent, so running this on every startup is
    /// safe and leaves existing messages in place.
    pub async fn declare(self, broker: Arc<dyn Broker>) -> Result<DeclaredTopology, BrokerError> {
        if self.exchange.trim().is_empty() {
            return Err(BrokerError::InvalidTopology(
                "exchange name is empty".to_string(),
            ));
        }
        if self.queues.is_empty() {
            return Err(BrokerError::InvalidTopology(format!(
                "no queue bound to {}",
                self.exchange
            )));
        }
        if let Some(blank) = self.queues.iter().find(|q| q.trim().is_empty()) {
            return Err(BrokerError::InvalidTopology(format!(
                "invalid queue name {:?}",
                blank
            )));
        }

        broker.declare_exchange(&self.exchange).await?;
        for queue in &self.queues {
            broker.declare_queue(queue).await?;
            broker.bind_queue(queue, &self.exchange).await?;
            tracing::info!(exchange = %self.exchange, queue = %queue, "Queue bound");
        }

        Ok(DeclaredTopology {
            broker,
            exchange: self.exchange,
            queues: self.queues,
        })
    }
}

impl Default for FanoutTopology {
    fn default() -> Self {
        Self::new(
            DEFAULT_EXCHANGE,
            DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
        )
    }
}

/// Topology applied to a broker; every listed queue is bound
#[derive(Clone)]
pub struct DeclaredTopology {
    broker: Arc<dyn Broker>,
    exchange: String,
    queues: Vec<String>,
}

impl DeclaredTopology {
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }
}

impl std::fmt::Debug for DeclaredTopology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclaredTopology")
            .field("exchange", &self.exchange)
            .field("queues", &self.queues)
            .finish()
    }
}
