//! Provisioning Handler
//!
//! Account creation and identifier linking. Identifiers are normalized and
//! sealed exactly as the resolver does at lookup time.

use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{CipherError, DeterministicCipher, SealedIdentifier};
use crate::domain::{Balance, RecipientIdentifier};
use crate::ledger::{AccountDirectory, AccountRecord, StoreError};

use super::{CreateAccountCommand, CreateAccountResult, LinkCardCommand, LinkPhoneCommand};

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("{0}")]
    Invalid(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Identifier encryption failed: {0}")]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ProvisioningError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => ProvisioningError::AccountNotFound(id),
            StoreError::Duplicate(what) => ProvisioningError::Invalid(format!("{} already in use", what)),
            other => ProvisioningError::Store(other),
        }
    }
}

/// Handler for account and link provisioning
#[derive(Clone)]
pub struct ProvisioningHandler {
    cipher: Arc<dyn DeterministicCipher>,
    accounts: Arc<dyn AccountDirectory>,
}

impl ProvisioningHandler {
    pub fn new(cipher: Arc<dyn DeterministicCipher>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { cipher, accounts }
    }

    /// Create an account and link its card.
    ///
    /// Creating an existing account id leaves the stored account untouched;
    /// the card is linked either way.
    pub async fn create_account(
        &self,
        command: CreateAccountCommand,
    ) -> Result<CreateAccountResult, ProvisioningError> {
        require_account_id(command.account_id)?;
        if command.user_id.is_nil() {
            return Err(ProvisioningError::Invalid("Invalid user ID".to_string()));
        }
        if command.currency.trim().is_empty() {
            return Err(ProvisioningError::Invalid("Missing currency".to_string()));
        }
        let balance = Balance::try_new(command.balance)
            .map_err(|_| ProvisioningError::Invalid("Invalid balance".to_string()))?;

        let account_number = RecipientIdentifier::AccountNumber(command.account_number);
        let phone = RecipientIdentifier::Phone(command.phone_number);
        let card = RecipientIdentifier::Card(command.card_number);
        for identifier in [&account_number, &phone, &card] {
            identifier
                .validate_for_link()
                .map_err(ProvisioningError::Invalid)?;
        }

        let record = AccountRecord {
            account_id: command.account_id,
            user_id: command.user_id,
            account_number: self.seal(&account_number)?,
            phone_number: self.seal(&phone)?,
            currency: command.currency.trim().to_uppercase(),
            balance,
        };

        let created = self.accounts.create_account(&record).await?;
        if !created {
            tracing::info!(account_id = %command.account_id, "Account already exists");
        }

        self.accounts
            .link_card(&self.seal(&card)?, command.account_id)
            .await?;

        tracing::info!(
            account_id = %command.account_id,
            user_id = %command.user_id,
            created = created,
            "Account provisioned"
        );

        Ok(CreateAccountResult {
            account_id: command.account_id,
            created,
        })
    }

    /// Link a card to an account, replacing any previous link of the card
    pub async fn link_card(&self, command: LinkCardCommand) -> Result<(), ProvisioningError> {
        let card = RecipientIdentifier::Card(command.card_number);
        card.validate_for_link().map_err(ProvisioningError::Invalid)?;
        require_account_id(command.account_id)?;

        self.accounts
            .link_card(&self.seal(&card)?, command.account_id)
            .await?;

        tracing::info!(account_id = %command.account_id, "Card linked");
        Ok(())
    }

    /// Link a phone number to an account, replacing any previous link
    pub async fn link_phone(&self, command: LinkPhoneCommand) -> Result<(), ProvisioningError> {
        let phone = RecipientIdentifier::Phone(command.phone_number);
        phone.validate_for_link().map_err(ProvisioningError::Invalid)?;
        require_account_id(command.account_id)?;

        self.accounts
            .link_phone(&self.seal(&phone)?, command.account_id)
            .await?;

        tracing::info!(account_id = %command.account_id, "Phone linked");
        Ok(())
    }

    fn seal(&self, identifier: &RecipientIdentifier) -> Result<SealedIdentifier, CipherError> {
        self.cipher.seal(&identifier.normalized())
    }
}

fn require_account_id(account_id: Uuid) -> Result<(), ProvisioningError> {
    if account_id.is_nil() {
        return Err(ProvisioningError::Invalid("Invalid account ID".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SivCipher;
    use crate::domain::IdentifierKind;
    use crate::ledger::{InMemoryStore, LinkDirectory};

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn setup() -> (ProvisioningHandler, Arc<InMemoryStore>, Arc<SivCipher>) {
        let cipher = Arc::new(SivCipher::from_hex(KEY_HEX).unwrap());
        let store = Arc::new(InMemoryStore::new());
        let handler = ProvisioningHandler::new(cipher.clone(), store.clone());
        (handler, store, cipher)
    }

    fn create_command(account_id: Uuid) -> CreateAccountCommand {
        CreateAccountCommand {
            account_id,
            user_id: Uuid::new_v4(),
            account_number: "40817810000000000001".to_string(),
            phone_number: "+15551234567".to_string(),
            currency: "rub".to_string(),
            balance: 1000,
            card_number: "4276-0000-1111-2222".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_account_links_card() {
        let (handler, store, cipher) = setup();
        let account_id = Uuid::new_v4();

        let result = handler.create_account(create_command(account_id)).await.unwrap();
        assert!(result.created);

        let sealed = cipher.seal("4276000011112222").unwrap();
        let found = store.find_account(IdentifierKind::Card, &sealed).await.unwrap();
        assert_eq!(found, Some(account_id));
        assert_eq!(store.balance(account_id).await.unwrap(), Some(Balance::new(1000)));
    }

    #[tokio::test]
    async fn test_create_account_twice_keeps_original() {
        let (handler, store, _) = setup();
        let account_id = Uuid::new_v4();
        handler.create_account(create_command(account_id)).await.unwrap();

        let mut again = create_command(account_id);
        again.balance = 5;
        let result = handler.create_account(again).await.unwrap();

        assert!(!result.created);
        assert_eq!(store.balance(account_id).await.unwrap(), Some(Balance::new(1000)));
    }

    #[tokio::test]
    async fn test_account_number_must_be_unique() {
        let (handler, _, _) = setup();
        handler.create_account(create_command(Uuid::new_v4())).await.unwrap();

        let err = handler
            .create_account(create_command(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(msg) if msg == "account number already in use"));
    }

    #[tokio::test]
    async fn test_opening_balance_must_fit_ledger() {
        let (handler, store, _) = setup();
        let account_id = Uuid::new_v4();
        let mut command = create_command(account_id);
        command.balance = i64::MAX as u64 + 1;

        let err = handler.create_account(command).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(msg) if msg == "Invalid balance"));
        assert_eq!(store.balance(account_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_link_card_validation() {
        let (handler, _, _) = setup();

        let err = handler
            .link_card(LinkCardCommand {
                card_number: "1234".to_string(),
                account_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(msg) if msg == "Invalid card details"));

        let err = handler
            .link_card(LinkCardCommand {
                card_number: "4276000011112222".to_string(),
                account_id: Uuid::nil(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(msg) if msg == "Invalid account ID"));
    }

    #[tokio::test]
    async fn test_link_phone_to_unknown_account() {
        let (handler, _, _) = setup();

        let err = handler
            .link_phone(LinkPhoneCommand {
                phone_number: "+15551234567".to_string(),
                account_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_link_phone_rejects_wrong_length() {
        let (handler, _, _) = setup();

        let err = handler
            .link_phone(LinkPhoneCommand {
                phone_number: "+1555".to_string(),
                account_id: Uuid::new_v4(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::Invalid(msg) if msg == "Invalid phone number"));
    }
}
