//! Command Handlers module
//!
//! Handlers that orchestrate business operations.
//! The transfer pipeline is builder -> executor -> publisher, composed by
//! `TransferHandler`; provisioning writes go through `ProvisioningHandler`.

mod builder;
mod commands;
mod executor;
mod provisioning_handler;
mod transfer_handler;


pub use builder::{BuildError, TransferRequestBuilder};
pub use commands::*;
pub use executor::{TransferExecutor, DEFAULT_STORE_TIMEOUT};
pub use provisioning_handler::{ProvisioningError, ProvisioningHandler};
pub use transfer_handler::{TransferHandler, TransferState};
