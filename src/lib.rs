//! transfer_gateway Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod broker;
pub mod crypto;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod outbox;
pub mod projection;
pub mod resolver;

pub mod config;
pub mod db;
mod error;

pub use config::{Config, LogFormat};
pub use domain::{
    Amount, AmountError, Balance, IdentifierKind, OperationContext, RecipientIdentifier,
    TransactionEvent, TransferError,
};
pub use error::{AppError, AppResult, ErrorResponse};
