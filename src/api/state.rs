//! Shared application state
//!
//! Handlers are built once at startup and cloned into every request.

use std::sync::Arc;
use std::time::Duration;

use crate::broker::TransferEventPublisher;
use crate::crypto::DeterministicCipher;
use crate::handlers::{
    ProvisioningHandler, TransferExecutor, TransferHandler, TransferRequestBuilder,
};
use crate::ledger::{AccountDirectory, Ledger, LinkDirectory};
use crate::outbox::Outbox;
use crate::resolver::IdentifierResolver;

#[derive(Clone)]
pub struct AppState {
    pub transfers: TransferHandler,
    pub provisioning: ProvisioningHandler,
}

impl AppState {
    pub fn new(transfers: TransferHandler, provisioning: ProvisioningHandler) -> Self {
        Self {
            transfers,
            provisioning,
        }
    }

    /// Wire the handlers around a single store that serves links, accounts,
    /// the ledger and the outbox.
    ///
    /// `store_timeout` bounds every lookup and every ledger call.
    pub fn assemble<S>(
        cipher: Arc<dyn DeterministicCipher>,
        store: Arc<S>,
        publisher: TransferEventPublisher,
        store_timeout: Duration,
    ) -> Self
    where
        S: LinkDirectory + AccountDirectory + Ledger + Outbox + 'static,
    {
        let resolver =
            IdentifierResolver::new(cipher.clone(), store.clone()).with_timeout(store_timeout);
        let executor = TransferExecutor::new(store.clone()).with_timeout(store_timeout);

        let transfers = TransferHandler::new(
            TransferRequestBuilder::new(resolver),
            executor,
            publisher,
            store.clone(),
        );
        let provisioning = ProvisioningHandler::new(cipher, store);

        Self::new(transfers, provisioning)
    }
}
