//! Transfer Handler
//!
//! Orchestrates one transfer: build, execute, publish. Each request walks the
//! state machine below exactly once and ends in a single terminal state.
//!
//! ```text
//! Received -> Built -> Executed -> Published -> Succeeded
//!     |         |          |
//!     v         v          v
//! Rejected    Failed   PartiallyCompleted
//! ```

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::broker::TransferEventPublisher;
use crate::domain::{OperationContext, TransactionEvent, TransferError};
use crate::outbox::Outbox;

use super::{TransferCommand, TransferExecutor, TransferRequestBuilder, TransferResult};

/// Lifecycle of a single transfer request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferState {
    Received,
    Built,
    Executed,
    Published,
    Succeeded,
    /// Request invalid or recipient unresolvable; nothing was executed
    Rejected,
    /// Ledger refused or could not be reached; nothing was published
    Failed,
    /// Committed but not yet propagated; the outbox relay takes over
    PartiallyCompleted,
}

impl TransferState {
    pub fn can_transition_to(self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Received, Built)
                | (Received, Rejected)
                | (Built, Executed)
                | (Built, Failed)
                | (Executed, Published)
                | (Executed, PartiallyCompleted)
                | (Published, Succeeded)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Succeeded
                | TransferState::Rejected
                | TransferState::Failed
                | TransferState::PartiallyCompleted
        )
    }

    /// Terminal states reported to the caller as success
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TransferState::Succeeded | TransferState::PartiallyCompleted
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the state of one request and logs every transition
struct Progress {
    state: TransferState,
    transfer_id: Option<Uuid>,
    correlation_id: Option<Uuid>,
}

impl Progress {
    fn new(context: &OperationContext) -> Self {
        Self {
            state: TransferState::Received,
            transfer_id: None,
            correlation_id: context.correlation_id,
        }
    }

    fn advance(&mut self, next: TransferState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(
            transfer_id = ?self.transfer_id,
            correlation_id = ?self.correlation_id,
            from = %self.state,
            to = %next,
            "Transfer state changed"
        );
        self.state = next;
    }
}

/// Handler for transfers addressed by any recipient identifier
#[derive(Clone)]
pub struct TransferHandler {
    builder: TransferRequestBuilder,
    executor: TransferExecutor,
    publisher: TransferEventPublisher,
    outbox: Arc<dyn Outbox>,
}

impl TransferHandler {
    pub fn new(
        builder: TransferRequestBuilder,
        executor: TransferExecutor,
        publisher: TransferEventPublisher,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            builder,
            executor,
            publisher,
            outbox,
        }
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferResult, TransferError> {
        let mut progress = Progress::new(context);

        let intent = match self.builder.build(&command, context).await {
            Ok(intent) => intent,
            Err(e) => {
                progress.advance(TransferState::Rejected);
                let err = TransferError::from(e);
                tracing::info!(
                    correlation_id = ?context.correlation_id,
                    error = %err,
                    "Transfer rejected"
                );
                return Err(err);
            }
        };
        progress.transfer_id = Some(intent.transfer_id);
        progress.advance(TransferState::Built);

        let receipt = match self.executor.execute(&intent).await {
            Ok(receipt) => receipt,
            Err(e) => {
                progress.advance(TransferState::Failed);
                let err = TransferError::from(e);
                if err.is_client_error() {
                    tracing::info!(
                        transfer_id = %intent.transfer_id,
                        sender_account_id = %intent.sender_account_id,
                        error = %err,
                        "Transfer refused by ledger"
                    );
                } else {
                    tracing::error!(
                        transfer_id = %intent.transfer_id,
                        sender_account_id = %intent.sender_account_id,
                        error = %err,
                        "Transfer failed"
                    );
                }
                return Err(err);
            }
        };
        progress.advance(TransferState::Executed);

        tracing::info!(
            transfer_id = %intent.transfer_id,
            sender_account_id = %intent.sender_account_id,
            receiver_account_id = %intent.receiver_account_id,
            receiver_kind = %intent.receiver_kind,
            amount = intent.amount.minor_units(),
            replayed = receipt.replayed,
            "Transfer committed"
        );

        if let Some(blocking) = self.older_pending_entry(intent.transfer_id).await {
            progress.advance(TransferState::PartiallyCompleted);
            tracing::info!(
                transfer_id = %intent.transfer_id,
                blocked_by = ?blocking,
                "Older outbox entries pending; publish deferred to outbox relay"
            );
            return Ok(TransferResult {
                transfer_id: intent.transfer_id,
                state: progress.state,
                replayed: receipt.replayed,
            });
        }

        let event = TransactionEvent::from(receipt.event);
        match self.publisher.publish(&event).await {
            Ok(()) => {
                progress.advance(TransferState::Published);
                if let Err(e) = self.outbox.mark_published(intent.transfer_id).await {
                    // Entry stays pending; the relay re-publishes and consumers dedupe
                    tracing::warn!(
                        transfer_id = %intent.transfer_id,
                        error = %e,
                        "Failed to mark outbox entry published"
                    );
                }
                progress.advance(TransferState::Succeeded);
            }
            Err(e) => {
                progress.advance(TransferState::PartiallyCompleted);
                tracing::error!(
                    transfer_id = %intent.transfer_id,
                    error = %e,
                    "Transfer committed but event not published; left for outbox relay"
                );
                if let Err(record_err) = self
                    .outbox
                    .record_failure(intent.transfer_id, &e.to_string())
                    .await
                {
                    tracing::error!(
                        transfer_id = %intent.transfer_id,
                        error = %record_err,
                        "Failed to record publish failure on outbox entry"
                    );
                }
            }
        }

        Ok(TransferResult {
            transfer_id: intent.transfer_id,
            state: progress.state,
            replayed: receipt.replayed,
        })
    }

    /// Oldest pending outbox entry if it belongs to another transfer.
    ///
    /// Events must reach the queues in commit order, so a transfer committed
    /// behind an undelivered one is left to the relay. An unreadable outbox
    /// defers as well.
    async fn older_pending_entry(&self, transfer_id: Uuid) -> Option<Option<Uuid>> {
        match self.outbox.pending(1).await {
            Ok(pending) => match pending.first() {
                Some(oldest) if oldest.transfer_id != transfer_id => Some(Some(oldest.transfer_id)),
                _ => None,
            },
            Err(e) => {
                tracing::warn!(
                    transfer_id = %transfer_id,
                    error = %e,
                    "Could not read outbox"
                );
                Some(None)
            }
        }
    }
}
