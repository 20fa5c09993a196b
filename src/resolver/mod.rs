//! Identifier resolution
//!
//! Maps a recipient identifier to the account currently linked to it. The raw
//! identifier is normalized and sealed with the same deterministic cipher used
//! when the link was written, then looked up by equality.

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::crypto::DeterministicCipher;
use crate::domain::{IdentifierKind, RecipientIdentifier, TransferError};
use crate::ledger::LinkDirectory;

/// Default bound on a single lookup
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No account is linked to the identifier
    #[error("No account linked to {0}")]
    NotFound(IdentifierKind),

    /// Lookup could not be performed
    #[error("Resolver unavailable: {0}")]
    Unavailable(String),
}

impl From<ResolveError> for TransferError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound(kind) => TransferError::NotFound(kind),
            ResolveError::Unavailable(msg) => TransferError::Unavailable(msg),
        }
    }
}

/// Read-only resolver over the link tables
#[derive(Clone)]
pub struct IdentifierResolver {
    cipher: Arc<dyn DeterministicCipher>,
    links: Arc<dyn LinkDirectory>,
    timeout: Duration,
}

impl IdentifierResolver {
    pub fn new(cipher: Arc<dyn DeterministicCipher>, links: Arc<dyn LinkDirectory>) -> Self {
        Self {
            cipher,
            links,
            timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve `identifier` to an account id
    pub async fn resolve(&self, identifier: &RecipientIdentifier) -> Result<Uuid, ResolveError> {
        let kind = identifier.kind();

        let sealed = self
            .cipher
            .seal(&identifier.normalized())
            .map_err(|e| ResolveError::Unavailable(e.to_string()))?;

        let lookup = self.links.find_account(kind, &sealed);
        let found = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result.map_err(|e| {
                tracing::error!(kind = %kind, error = %e, "Identifier lookup failed");
                ResolveError::Unavailable(e.to_string())
            })?,
            Err(_) => {
                tracing::error!(kind = %kind, timeout_ms = self.timeout.as_millis() as u64, "Identifier lookup timed out");
                return Err(ResolveError::Unavailable("lookup timed out".to_string()));
            }
        };

        match found {
            Some(account_id) => {
                tracing::debug!(kind = %kind, account_id = %account_id, "Identifier resolved");
                Ok(account_id)
            }
            None => {
                tracing::info!(kind = %kind, "No account linked to identifier");
                Err(ResolveError::NotFound(kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SivCipher;
    use crate::domain::Balance;
    use crate::ledger::{AccountDirectory, AccountRecord, InMemoryStore};

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    async fn setup() -> (IdentifierResolver, Arc<InMemoryStore>, Arc<SivCipher>) {
        let cipher = Arc::new(SivCipher::from_hex(KEY_HEX).unwrap());
        let store = Arc::new(InMemoryStore::new());
        let resolver = IdentifierResolver::new(cipher.clone(), store.clone());
        (resolver, store, cipher)
    }

    async fn create_account(store: &InMemoryStore, cipher: &SivCipher, number: &str) -> Uuid {
        let account_id = Uuid::new_v4();
        store
            .create_account(&AccountRecord {
                account_id,
                user_id: Uuid::new_v4(),
                account_number: cipher.seal(number).unwrap(),
                phone_number: cipher.seal(&format!("+7{}", number)).unwrap(),
                currency: "RUB".to_string(),
                balance: Balance::zero(),
            })
            .await
            .unwrap();
        account_id
    }

    #[tokio::test]
    async fn test_resolves_each_kind() {
        let (resolver, store, cipher) = setup().await;
        let account_id = create_account(&store, &cipher, "40817810000000000001").await;

        store
            .link_card(&cipher.seal("4276000011112222").unwrap(), account_id)
            .await
            .unwrap();
        store
            .link_phone(&cipher.seal("+15551234567").unwrap(), account_id)
            .await
            .unwrap();

        let card = RecipientIdentifier::Card("4276 0000 1111 2222".to_string());
        let phone = RecipientIdentifier::Phone(" +15551234567 ".to_string());
        let number = RecipientIdentifier::AccountNumber("40817810000000000001".to_string());

        assert_eq!(resolver.resolve(&card).await.unwrap(), account_id);
        assert_eq!(resolver.resolve(&phone).await.unwrap(), account_id);
        assert_eq!(resolver.resolve(&number).await.unwrap(), account_id);
    }

    #[tokio::test]
    async fn test_unlinked_identifier_is_not_found() {
        let (resolver, _store, _cipher) = setup().await;

        let err = resolver
            .resolve(&RecipientIdentifier::Card("0000111122223333".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::NotFound(IdentifierKind::Card));

        let transfer_err: TransferError = err.into();
        assert!(transfer_err.is_client_error());
    }

    #[tokio::test]
    async fn test_relink_returns_latest_account() {
        let (resolver, store, cipher) = setup().await;
        let first = create_account(&store, &cipher, "1").await;
        let second = create_account(&store, &cipher, "2").await;
        let sealed = cipher.seal("+15551234567").unwrap();

        store.link_phone(&sealed, first).await.unwrap();
        store.link_phone(&sealed, second).await.unwrap();

        let phone = RecipientIdentifier::Phone("+15551234567".to_string());
        assert_eq!(resolver.resolve(&phone).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_store_outage_is_unavailable() {
        let (resolver, store, _cipher) = setup().await;
        store.set_unavailable(true);

        let err = resolver
            .resolve(&RecipientIdentifier::Phone("+15551234567".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unavailable(_)));

        let transfer_err: TransferError = err.into();
        assert!(transfer_err.is_retryable());
    }
}
