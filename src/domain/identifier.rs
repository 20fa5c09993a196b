//! Recipient identifiers
//!
//! A transfer recipient is addressed by exactly one public identifier.
//! Identifiers are normalized the same way at link-time and at lookup-time so
//! that their deterministic ciphertexts compare equal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Required length of a card number (digits only)
pub const CARD_NUMBER_LEN: usize = 16;

/// Required length of a phone number in international format, e.g. `+15551234567`
pub const PHONE_NUMBER_LEN: usize = 12;

/// Kind of identifier used to address a recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    Card,
    Phone,
    AccountNumber,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::Card => "card",
            IdentifierKind::Phone => "phone",
            IdentifierKind::AccountNumber => "account_number",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recipient identifier tagged with its kind.
///
/// `Debug` is implemented by hand so raw identifiers never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RecipientIdentifier {
    Card(String),
    Phone(String),
    AccountNumber(String),
}

impl RecipientIdentifier {
    pub fn kind(&self) -> IdentifierKind {
        match self {
            RecipientIdentifier::Card(_) => IdentifierKind::Card,
            RecipientIdentifier::Phone(_) => IdentifierKind::Phone,
            RecipientIdentifier::AccountNumber(_) => IdentifierKind::AccountNumber,
        }
    }

    /// Canonical form fed into the identifier cipher.
    ///
    /// Card and account numbers drop whitespace and dashes; phone numbers are trimmed.
    pub fn normalized(&self) -> String {
        match self {
            RecipientIdentifier::Card(v) | RecipientIdentifier::AccountNumber(v) => v
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect(),
            RecipientIdentifier::Phone(v) => v.trim().to_string(),
        }
    }

    /// True if nothing is left after normalization
    pub fn is_blank(&self) -> bool {
        self.normalized().is_empty()
    }

    /// Validate the stricter shape rules applied when linking an identifier.
    pub fn validate_for_link(&self) -> Result<(), String> {
        let normalized = self.normalized();
        match self {
            RecipientIdentifier::Card(_) => {
                if normalized.len() != CARD_NUMBER_LEN
                    || !normalized.chars().all(|c| c.is_ascii_digit())
                {
                    return Err("Invalid card details".to_string());
                }
            }
            RecipientIdentifier::Phone(_) => {
                if normalized.chars().count() != PHONE_NUMBER_LEN {
                    return Err("Invalid phone number".to_string());
                }
            }
            RecipientIdentifier::AccountNumber(_) => {
                if normalized.is_empty() {
                    return Err("Invalid account number".to_string());
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RecipientIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientIdentifier({}, [REDACTED])", self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_dispatch() {
        assert_eq!(RecipientIdentifier::Card("1".into()).kind(), IdentifierKind::Card);
        assert_eq!(RecipientIdentifier::Phone("1".into()).kind(), IdentifierKind::Phone);
        assert_eq!(
            RecipientIdentifier::AccountNumber("1".into()).kind(),
            IdentifierKind::AccountNumber
        );
    }

    #[test]
    fn test_normalization() {
        let card = RecipientIdentifier::Card(" 4111-1111 1111-1111 ".into());
        assert_eq!(card.normalized(), "4111111111111111");

        let phone = RecipientIdentifier::Phone("  +15551234567\n".into());
        assert_eq!(phone.normalized(), "+15551234567");

        assert!(RecipientIdentifier::AccountNumber(" - ".into()).is_blank());
    }

    #[test]
    fn test_link_validation() {
        assert!(RecipientIdentifier::Card("4111111111111111".into())
            .validate_for_link()
            .is_ok());
        assert!(RecipientIdentifier::Card("411111111111111".into())
            .validate_for_link()
            .is_err());
        assert!(RecipientIdentifier::Card("41111111111111x1".into())
            .validate_for_link()
            .is_err());
        assert!(RecipientIdentifier::Phone("+15551234567".into())
            .validate_for_link()
            .is_ok());
        assert!(RecipientIdentifier::Phone("5551234567".into())
            .validate_for_link()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_value() {
        let id = RecipientIdentifier::Card("4111111111111111".into());
        let printed = format!("{:?}", id);
        assert!(!printed.contains("4111"));
        assert!(printed.contains("card"));
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&IdentifierKind::AccountNumber).unwrap();
        assert_eq!(json, r#""account_number""#);
    }
}
