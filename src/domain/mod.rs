//! Domain module
//!
//! Core domain types: amounts, identifiers, intents, events and the transfer error taxonomy.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod identifier;
pub mod intent;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use error::TransferError;
pub use events::{TransactionEvent, TransferCompleted};
pub use identifier::{IdentifierKind, RecipientIdentifier};
pub use intent::TransferIntent;
