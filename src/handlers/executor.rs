//! Transfer Executor
//!
//! Runs the ledger's atomic transfer for an intent with a bounded wait.
//! The ledger call runs on its own task: if the caller goes away or the wait
//! times out, the store operation still runs to completion.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::TransferIntent;
use crate::ledger::{CommitReceipt, Ledger, LedgerError};

/// Default bound on one ledger call
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_ATTEMPTS: u32 = 3;

/// Executes transfer intents against the ledger
#[derive(Clone)]
pub struct TransferExecutor {
    ledger: Arc<dyn Ledger>,
    timeout: Duration,
}

impl TransferExecutor {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self {
            ledger,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Commit `intent`, retrying transient failures with the same transfer id.
    ///
    /// A timeout is reported as `Unavailable` without retrying: the first
    /// attempt may still commit, and the caller decides whether to retry.
    pub async fn execute(&self, intent: &TransferIntent) -> Result<CommitReceipt, LedgerError> {
        for attempt in 0..MAX_ATTEMPTS {
            match self.execute_once(intent).await {
                Err(Attempt::Failed(LedgerError::Unavailable(msg))) if attempt < MAX_ATTEMPTS - 1 => {
                    let delay = Duration::from_millis(50 * (attempt as u64 + 1));
                    tracing::warn!(
                        transfer_id = %intent.transfer_id,
                        error = %msg,
                        "Ledger unavailable, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_ATTEMPTS
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Attempt::Failed(e)) => return Err(e),
                Err(Attempt::TimedOut) => {
                    tracing::error!(
                        transfer_id = %intent.transfer_id,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Ledger call timed out, outcome unknown"
                    );
                    return Err(LedgerError::Unavailable(format!(
                        "ledger did not answer within {}ms",
                        self.timeout.as_millis()
                    )));
                }
                Ok(receipt) => return Ok(receipt),
            }
        }

        Err(LedgerError::Unavailable(
            "maximum attempts exceeded".to_string(),
        ))
    }

    async fn execute_once(&self, intent: &TransferIntent) -> Result<CommitReceipt, Attempt> {
        let ledger = Arc::clone(&self.ledger);
        let owned = intent.clone();
        let task = tokio::spawn(async move { ledger.process_transfer(&owned).await });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(Attempt::Failed),
            Ok(Err(join_error)) => Err(Attempt::Failed(LedgerError::Unavailable(format!(
                "ledger task failed: {}",
                join_error
            )))),
            // Dropping the join handle detaches the task; it keeps running
            Err(_) => Err(Attempt::TimedOut),
        }
    }
}

enum Attempt {
    Failed(LedgerError),
    TimedOut,
}
