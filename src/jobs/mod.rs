//! Scheduled Jobs
//!
//! Background jobs for the transfer outbox: relaying events whose publish
//! did not complete at request time, and purging entries that are done.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::broker::TransferEventPublisher;
use crate::ledger::StoreError;
use crate::outbox::Outbox;

// =========================================================================
// Outbox Relay Job
// =========================================================================

/// Publish pending outbox entries in commit order.
///
/// Stops at the first publish failure so later transfers never overtake an
/// earlier one on the queues; the failed entry is retried on the next run.
pub async fn relay_pending(
    outbox: &dyn Outbox,
    publisher: &TransferEventPublisher,
    batch_size: i64,
) -> Result<RelayReport, JobError> {
    let pending = outbox.pending(batch_size).await?;
    let mut report = RelayReport {
        scanned: pending.len(),
        ..RelayReport::default()
    };

    for entry in pending {
        match publisher.publish(&entry.event).await {
            Ok(()) => {
                outbox.mark_published(entry.transfer_id).await?;
                report.published += 1;
            }
            Err(e) => {
                tracing::warn!(
                    transfer_id = %entry.transfer_id,
                    attempts = entry.attempts + 1,
                    error = %e,
                    "Outbox relay publish failed"
                );
                outbox.record_failure(entry.transfer_id, &e.to_string()).await?;
                report.failed += 1;
                break;
            }
        }
    }

    if report.published > 0 {
        tracing::info!(
            published = report.published,
            scanned = report.scanned,
            "Relayed pending transfer events"
        );
    }

    Ok(report)
}

/// Result of one relay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub scanned: usize,
    pub published: usize,
    pub failed: usize,
}

// =========================================================================
// Outbox Purge Job
// =========================================================================

/// Delete published outbox entries older than `retention`
pub async fn purge_published(outbox: &dyn Outbox, retention: Duration) -> Result<u64, JobError> {
    let retention = chrono::Duration::from_std(retention)
        .map_err(|e| JobError::InvalidConfig(e.to_string()))?;
    let cutoff = Utc::now()
        .checked_sub_signed(retention)
        .ok_or_else(|| JobError::InvalidConfig("retention exceeds the timestamp range".to_string()))?;

    let rows_deleted = outbox.purge_published(cutoff).await?;

    if rows_deleted > 0 {
        tracing::info!(rows_deleted = rows_deleted, "Purged published outbox entries");
    }

    Ok(rows_deleted)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the outbox relay (default: 5 seconds)
    pub relay_interval: Duration,
    /// Maximum entries relayed per run (default: 100)
    pub relay_batch_size: i64,
    /// Interval for the purge job (default: 1 hour)
    pub purge_interval: Duration,
    /// Age after which published entries are purged (default: 7 days)
    pub retention: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            relay_interval: Duration::from_secs(5),
            relay_batch_size: 100,
            purge_interval: Duration::from_secs(3600),
            retention: Duration::from_secs(168 * 3600),
        }
    }
}

/// Job Scheduler - runs the outbox jobs periodically
pub struct JobScheduler {
    outbox: Arc<dyn Outbox>,
    publisher: TransferEventPublisher,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(outbox: Arc<dyn Outbox>, publisher: TransferEventPublisher) -> Self {
        Self::with_config(outbox, publisher, JobSchedulerConfig::default())
    }

    pub fn with_config(
        outbox: Arc<dyn Outbox>,
        publisher: TransferEventPublisher,
        config: JobSchedulerConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            config,
        }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        // Spread the first relay of replicas that start together
        let jitter_ms = self.config.relay_interval.as_millis() as u64 / 2;
        if jitter_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=jitter_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        tracing::info!(
            relay_interval_ms = self.config.relay_interval.as_millis() as u64,
            "Job scheduler started"
        );

        let mut relay_interval = interval(self.config.relay_interval);
        let mut purge_interval = interval(self.config.purge_interval);

        loop {
            tokio::select! {
                _ = relay_interval.tick() => {
                    if let Err(e) = relay_pending(
                        self.outbox.as_ref(),
                        &self.publisher,
                        self.config.relay_batch_size,
                    ).await {
                        tracing::error!(error = %e, "Outbox relay failed");
                    }
                }
                _ = purge_interval.tick() => {
                    if let Err(e) = purge_published(self.outbox.as_ref(), self.config.retention).await {
                        tracing::error!(error = %e, "Outbox purge failed");
                    }
                }
            }
        }
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match relay_pending(
            self.outbox.as_ref(),
            &self.publisher,
            self.config.relay_batch_size,
        )
        .await
        {
            Ok(relay) => report.relay = relay,
            Err(e) => report.errors.push(format!("Outbox relay: {}", e)),
        }

        match purge_published(self.outbox.as_ref(), self.config.retention).await {
            Ok(count) => report.outbox_entries_purged = count,
            Err(e) => report.errors.push(format!("Outbox purge: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running the jobs once
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub relay: RelayReport,
    pub outbox_entries_purged: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid job configuration: {0}")]
    InvalidConfig(String),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{FanoutTopology, InMemoryBroker};
    use crate::crypto::SealedIdentifier;
    use crate::domain::{Amount, Balance, IdentifierKind, TransactionEvent, TransferIntent};
    use crate::ledger::{AccountDirectory, AccountRecord, InMemoryStore, Ledger};
    use uuid::Uuid;

    struct Fixture {
        store: Arc<InMemoryStore>,
        broker: Arc<InMemoryBroker>,
        publisher: TransferEventPublisher,
        sender: (Uuid, Uuid),
        receiver: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        let topology = FanoutTopology::default()
            .declare(broker.clone())
            .await
            .unwrap();

        let user = Uuid::new_v4();
        let mut ids = Vec::new();
        for tag in ["a", "b"] {
            let account_id = Uuid::new_v4();
            store
                .create_account(&AccountRecord {
                    account_id,
                    user_id: user,
                    account_number: SealedIdentifier::from_bytes(tag.as_bytes().to_vec()),
                    phone_number: SealedIdentifier::from_bytes(tag.as_bytes().to_vec()),
                    currency: "RUB".to_string(),
                    balance: Balance::new(1000),
                })
                .await
                .unwrap();
            ids.push(account_id);
        }

        Fixture {
            store,
            broker,
            publisher: TransferEventPublisher::new(topology),
            sender: (user, ids[0]),
            receiver: ids[1],
        }
    }

    async fn commit(f: &Fixture, amount: u64) -> Uuid {
        let intent = TransferIntent {
            transfer_id: Uuid::new_v4(),
            sender_id: f.sender.0,
            sender_account_id: f.sender.1,
            receiver_account_id: f.receiver,
            amount: Amount::new(amount).unwrap(),
            receiver_kind: IdentifierKind::Card,
            correlation_id: None,
        };
        f.store.process_transfer(&intent).await.unwrap();
        intent.transfer_id
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.relay_interval, Duration::from_secs(5));
        assert_eq!(config.relay_batch_size, 100);
        assert_eq!(config.retention, Duration::from_secs(604_800));
    }

    #[tokio::test]
    async fn test_relay_publishes_in_commit_order() {
        let f = fixture().await;
        let first = commit(&f, 1).await;
        let second = commit(&f, 2).await;
        let third = commit(&f, 3).await;

        let report = relay_pending(f.store.as_ref(), &f.publisher, 100)
            .await
            .unwrap();
        assert_eq!(report.published, 3);

        let order: Vec<Uuid> = f
            .broker
            .messages("mongo")
            .await
            .into_iter()
            .map(|m| {
                serde_json::from_value::<TransactionEvent>(m.payload)
                    .unwrap()
                    .transfer_id()
            })
            .collect();
        assert_eq!(order, vec![first, second, third]);
        assert!(f.store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relay_stops_at_first_failure() {
        let f = fixture().await;
        let first = commit(&f, 1).await;
        commit(&f, 2).await;
        f.broker.fail_publishes(true);

        let report = relay_pending(f.store.as_ref(), &f.publisher, 100)
            .await
            .unwrap();
        assert_eq!(report, RelayReport { scanned: 2, published: 0, failed: 1 });

        let pending = f.store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].transfer_id, first);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[1].attempts, 0);
    }

    #[tokio::test]
    async fn test_run_all_once_relays_and_purges() {
        let f = fixture().await;
        commit(&f, 5).await;

        let scheduler = JobScheduler::with_config(
            f.store.clone(),
            f.publisher.clone(),
            JobSchedulerConfig {
                retention: Duration::ZERO,
                ..JobSchedulerConfig::default()
            },
        );

        let report = scheduler.run_all_once().await;
        assert!(report.errors.is_empty());
        assert_eq!(report.relay.published, 1);
        assert_eq!(f.broker.depth("postgres").await, 1);

        // Published entries are gone after a zero retention purge
        tokio::time::sleep(Duration::from_millis(5)).await;
        let purged = purge_published(f.store.as_ref(), Duration::ZERO).await.unwrap();
        assert_eq!(purged + report.outbox_entries_purged, 1);
    }

    #[tokio::test]
    async fn test_store_outage_reports_error() {
        let f = fixture().await;
        f.store.set_unavailable(true);
        let scheduler = JobScheduler::new(f.store.clone(), f.publisher.clone());

        let report = scheduler.run_all_once().await;
        assert_eq!(report.errors.len(), 2);
    }
}
