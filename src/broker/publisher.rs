//! Transfer event publisher

use std::time::Duration;

use crate::domain::TransactionEvent;

use super::{BrokerError, BrokerMessage, DeclaredTopology};

/// Default bound on a single publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Broker unreachable, timed out or refused the message
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Fewer queues accepted the message than are bound by the topology
    #[error("Event reached {delivered} of {expected} queues")]
    Incomplete { expected: usize, delivered: usize },

    #[error("Event encoding failed: {0}")]
    Encode(String),
}

impl From<BrokerError> for PublishError {
    fn from(e: BrokerError) -> Self {
        PublishError::Unavailable(e.to_string())
    }
}

/// Publishes transfer events to the declared fanout exchange
#[derive(Debug, Clone)]
pub struct TransferEventPublisher {
    topology: DeclaredTopology,
    timeout: Duration,
}

impl TransferEventPublisher {
    pub fn new(topology: DeclaredTopology) -> Self {
        Self {
            topology,
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn topology(&self) -> &DeclaredTopology {
        &self.topology
    }

    /// Publish `event`; succeeds once every bound queue durably holds it
    pub async fn publish(&self, event: &TransactionEvent) -> Result<(), PublishError> {
        let payload =
            serde_json::to_value(event).map_err(|e| PublishError::Encode(e.to_string()))?;
        let message = BrokerMessage {
            message_id: event.delivery_id().to_string(),
            payload,
        };

        let exchange = self.topology.exchange();
        let publish = self.topology.broker().publish(exchange, &message);
        let delivered = match tokio::time::timeout(self.timeout, publish).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(PublishError::Unavailable(format!(
                    "publish timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        };

        let expected = self.topology.queues().len();
        if delivered < expected {
            return Err(PublishError::Incomplete {
                expected,
                delivered,
            });
        }

        tracing::debug!(
            transfer_id = %event.transfer_id(),
            event_type = event.event_type(),
            exchange = %exchange,
            queues = delivered,
            "Event published"
        );

        Ok(())
    }
}
