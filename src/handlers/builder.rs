//! Transfer Request Builder
//!
//! Turns a raw transfer command into a `TransferIntent`: every field is
//! validated before the store is touched, then the recipient is resolved and
//! a fresh transfer id is minted.

use uuid::Uuid;

use crate::domain::{Amount, IdentifierKind, OperationContext, TransferError, TransferIntent};
use crate::resolver::{IdentifierResolver, ResolveError};

use super::TransferCommand;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Missing caller identity")]
    MissingIdentity,

    #[error("Invalid sender account ID")]
    MalformedSenderAccount,

    #[error("Empty {0}")]
    BlankRecipient(IdentifierKind),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to the same account")]
    SameAccount,

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl From<BuildError> for TransferError {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Resolve(inner) => inner.into(),
            BuildError::MissingIdentity => TransferError::Unauthenticated,
            other => TransferError::Invalid(other.to_string()),
        }
    }
}

/// Validates transfer commands and resolves their recipient
#[derive(Clone)]
pub struct TransferRequestBuilder {
    resolver: IdentifierResolver,
}

impl TransferRequestBuilder {
    pub fn new(resolver: IdentifierResolver) -> Self {
        Self { resolver }
    }

    /// Build an intent for `command` on behalf of the caller in `context`
    pub async fn build(
        &self,
        command: &TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferIntent, BuildError> {
        let sender_id = context.request_user_id.ok_or(BuildError::MissingIdentity)?;

        let sender_account_id = command
            .sender_account_id
            .as_deref()
            .ok_or(BuildError::MissingField("account_id"))?;
        let sender_account_id = Uuid::parse_str(sender_account_id.trim())
            .map_err(|_| BuildError::MalformedSenderAccount)?;

        let recipient = command
            .recipient
            .as_ref()
            .ok_or(BuildError::MissingField("recipient"))?;
        if recipient.is_blank() {
            return Err(BuildError::BlankRecipient(recipient.kind()));
        }

        let amount = command.amount.ok_or(BuildError::MissingField("amount"))?;
        let amount = Amount::new(amount).map_err(|e| BuildError::InvalidAmount(e.to_string()))?;

        let receiver_account_id = self.resolver.resolve(recipient).await?;
        if receiver_account_id == sender_account_id {
            return Err(BuildError::SameAccount);
        }

        Ok(TransferIntent {
            transfer_id: Uuid::new_v4(),
            sender_id,
            sender_account_id,
            receiver_account_id,
            amount,
            receiver_kind: recipient.kind(),
            correlation_id: context.correlation_id,
        })
    }
}
