//! Projection consumer
//!
//! Leases deliveries from one queue, decodes them and hands them to a sink.
//! A delivery is acked only after the sink applied it (or recognized it as a
//! duplicate). The first failed delivery ends the batch: it and every
//! delivery behind it are released, so the queue hands them out again in
//! publish order.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::broker::{Broker, BrokerError, Delivery};
use crate::domain::{TransactionEvent, TransferCompleted};

const DEFAULT_BATCH_SIZE: usize = 32;
const DEFAULT_VISIBILITY: Duration = Duration::from_secs(30);

/// Result of applying one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    New,
    /// Transfer id was already applied; nothing changed
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Projection sink failed: {0}")]
    Sink(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// A read model fed from transfer events
#[async_trait]
pub trait ProjectionSink: Send + Sync {
    /// Apply `event`. Must be idempotent by transfer id.
    async fn apply(&self, event: &TransactionEvent) -> Result<Applied, ProjectionError>;
}

/// Counters for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub applied: usize,
    pub duplicates: usize,
    /// Undecodable payloads, acked and dropped
    pub discarded: usize,
    /// Left unacked for redelivery
    pub failed: usize,
    /// Leased behind a failed delivery and handed back unprocessed
    pub released: usize,
}

/// Drains one queue into one sink
pub struct QueueConsumer {
    broker: Arc<dyn Broker>,
    queue: String,
    sink: Arc<dyn ProjectionSink>,
    batch_size: usize,
    visibility: Duration,
}

impl QueueConsumer {
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        sink: Arc<dyn ProjectionSink>,
    ) -> Self {
        Self {
            broker,
            queue: queue.into(),
            sink,
            batch_size: DEFAULT_BATCH_SIZE,
            visibility: DEFAULT_VISIBILITY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_visibility(mut self, visibility: Duration) -> Self {
        self.visibility = visibility;
        self
    }

    /// Lease one batch and process it in queue order
    pub async fn poll_once(&self) -> Result<ConsumeReport, ProjectionError> {
        let deliveries = self
            .broker
            .fetch(&self.queue, self.batch_size, self.visibility)
            .await?;

        let mut report = ConsumeReport::default();
        let mut deliveries = deliveries.into_iter();
        while let Some(delivery) = deliveries.next() {
            let tag = delivery.delivery_tag;
            if self.handle(delivery, &mut report).await? {
                continue;
            }

            self.broker.release(&self.queue, tag).await?;
            for held in deliveries.by_ref() {
                self.broker.release(&self.queue, held.delivery_tag).await?;
                report.released += 1;
            }
        }

        if report != ConsumeReport::default() {
            tracing::debug!(
                queue = %self.queue,
                applied = report.applied,
                duplicates = report.duplicates,
                discarded = report.discarded,
                failed = report.failed,
                released = report.released,
                "Projection batch processed"
            );
        }

        Ok(report)
    }

    /// Process one delivery; `false` if the sink failed and it stays unacked
    async fn handle(
        &self,
        delivery: Delivery,
        report: &mut ConsumeReport,
    ) -> Result<bool, ProjectionError> {
        let event: TransactionEvent = match serde_json::from_value(delivery.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    queue = %self.queue,
                    message_id = %delivery.message_id,
                    error = %e,
                    "Undecodable event, discarding"
                );
                self.broker.ack(&self.queue, delivery.delivery_tag).await?;
                report.discarded += 1;
                return Ok(true);
            }
        };

        match self.sink.apply(&event).await {
            Ok(applied) => {
                self.broker.ack(&self.queue, delivery.delivery_tag).await?;
                match applied {
                    Applied::New => report.applied += 1,
                    Applied::Duplicate => report.duplicates += 1,
                }
            }
            Err(e) => {
                tracing::warn!(
                    queue = %self.queue,
                    transfer_id = %event.transfer_id(),
                    redelivered = delivery.redelivered,
                    error = %e,
                    "Projection failed, releasing batch for redelivery"
                );
                report.failed += 1;
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Deduplicating in-memory read model
#[derive(Debug, Default)]
pub struct InMemoryProjection {
    transfers: Mutex<HashMap<Uuid, TransferCompleted>>,
    failing: AtomicBool,
}

impl InMemoryProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent apply fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.transfers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.transfers.lock().await.is_empty()
    }

    pub async fn contains(&self, transfer_id: Uuid) -> bool {
        self.transfers.lock().await.contains_key(&transfer_id)
    }
}

#[async_trait]
impl ProjectionSink for InMemoryProjection {
    async fn apply(&self, event: &TransactionEvent) -> Result<Applied, ProjectionError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProjectionError::Sink("projection store unavailable".to_string()));
        }

        let TransactionEvent::TransferCompleted(completed) = event;
        if !completed.verify_delivery_id() {
            return Err(ProjectionError::Sink(format!(
                "delivery id mismatch for transfer {}",
                completed.transfer_id
            )));
        }

        let mut transfers = self.transfers.lock().await;
        if transfers.contains_key(&completed.transfer_id) {
            return Ok(Applied::Duplicate);
        }
        transfers.insert(completed.transfer_id, completed.clone());
        Ok(Applied::New)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerMessage, FanoutTopology, InMemoryBroker, TransferEventPublisher};
    use chrono::Utc;
    use serde_json::json;

    fn event() -> TransactionEvent {
        TransferCompleted::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            42,
            Utc::now(),
        )
        .into()
    }

    async fn setup() -> (Arc<InMemoryBroker>, TransferEventPublisher) {
        let broker = Arc::new(InMemoryBroker::new());
        let topology = FanoutTopology::default()
            .declare(broker.clone())
            .await
            .unwrap();
        (broker, TransferEventPublisher::new(topology))
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let sink = InMemoryProjection::new();
        let e = event();

        assert_eq!(sink.apply(&e).await.unwrap(), Applied::New);
        assert_eq!(sink.apply(&e).await.unwrap(), Applied::Duplicate);
        assert_eq!(sink.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_apply_is_redelivered() {
        let (broker, publisher) = setup().await;
        let sink = Arc::new(InMemoryProjection::new());
        let consumer = QueueConsumer::new(broker.clone(), "postgres", sink.clone());
        let e = event();
        publisher.publish(&e).await.unwrap();

        sink.set_failing(true);
        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(broker.depth("postgres").await, 1);

        // Consumer restarts; the lease is released
        broker.recover("postgres").await;
        sink.set_failing(false);
        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.applied, 1);
        assert!(sink.contains(e.transfer_id()).await);
        assert_eq!(broker.depth("postgres").await, 0);
    }

    /// Records apply order; fails the given transfer once
    struct FlakySink {
        fail_once: Mutex<Option<Uuid>>,
        applied: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl ProjectionSink for FlakySink {
        async fn apply(&self, event: &TransactionEvent) -> Result<Applied, ProjectionError> {
            let id = event.transfer_id();
            {
                let mut fail_once = self.fail_once.lock().await;
                if *fail_once == Some(id) {
                    *fail_once = None;
                    return Err(ProjectionError::Sink("write timed out".to_string()));
                }
            }
            self.applied.lock().await.push(id);
            Ok(Applied::New)
        }
    }

    #[tokio::test]
    async fn test_failed_delivery_holds_back_later_ones() {
        let (broker, publisher) = setup().await;
        let first = event();
        let second = event();
        publisher.publish(&first).await.unwrap();
        publisher.publish(&second).await.unwrap();

        let sink = Arc::new(FlakySink {
            fail_once: Mutex::new(Some(first.transfer_id())),
            applied: Mutex::new(Vec::new()),
        });
        let consumer = QueueConsumer::new(broker.clone(), "postgres", sink.clone());

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.released, 1);
        assert_eq!(report.applied, 0);
        assert!(sink.applied.lock().await.is_empty());
        assert_eq!(broker.depth("postgres").await, 2);

        let report = consumer.poll_once().await.unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(
            *sink.applied.lock().await,
            vec![first.transfer_id(), second.transfer_id()]
        );
        assert_eq!(broker.depth("postgres").await, 0);
    }

    #[tokio::test]
    async fn test_queues_are_consumed_independently() {
        let (broker, publisher) = setup().await;
        let relational = Arc::new(InMemoryProjection::new());
        let document = Arc::new(InMemoryProjection::new());
        publisher.publish(&event()).await.unwrap();

        document.set_failing(true);
        QueueConsumer::new(broker.clone(), "postgres", relational.clone())
            .poll_once()
            .await
            .unwrap();
        QueueConsumer::new(broker.clone(), "mongo", document.clone())
            .poll_once()
            .await
            .unwrap();

        assert_eq!(relational.len().await, 1);
        assert!(document.is_empty().await);
        assert_eq!(broker.depth("postgres").await, 0);
        assert_eq!(broker.depth("mongo").await, 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_discarded() {
        let (broker, _) = setup().await;
        broker
            .publish(
                "transaction_events",
                &BrokerMessage {
                    message_id: "garbage".into(),
                    payload: json!({ "type": "Unknown" }),
                },
            )
            .await
            .unwrap();

        let sink = Arc::new(InMemoryProjection::new());
        let report = QueueConsumer::new(broker.clone(), "mongo", sink.clone())
            .poll_once()
            .await
            .unwrap();

        assert_eq!(report.discarded, 1);
        assert!(sink.is_empty().await);
        assert_eq!(broker.depth("mongo").await, 0);
    }
}
