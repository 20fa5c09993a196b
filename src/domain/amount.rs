//! Amount type
//!
//! Domain primitive for monetary amounts in integer minor units (e.g. cents).
//! All amounts are validated at construction time, ensuring invalid values
//! cannot exist in the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest amount representable in the ledger's BIGINT columns
const MAX_MINOR_UNITS: u64 = i64::MAX as u64;

/// Amount represents a validated transfer value in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value fits into a signed 64-bit integer
///
/// # Example
/// ```
/// use transfer_gateway::domain::Amount;
///
/// let amount = Amount::new(500).unwrap();
/// assert_eq!(amount.minor_units(), 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive")]
    NotPositive,

    #[error("Amount exceeds maximum allowed value")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value is zero
    /// - `AmountError::Overflow` if value does not fit the ledger columns
    pub fn new(minor_units: u64) -> Result<Self, AmountError> {
        if minor_units == 0 {
            return Err(AmountError::NotPositive);
        }
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor_units))
    }

    /// Get the value in minor units.
    pub fn minor_units(&self) -> u64 {
        self.0
    }

    /// Value as stored in a BIGINT column. Lossless by construction.
    pub fn as_i64(&self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u64>()
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(value)
    }
}

impl TryFrom<u64> for Amount {
    type Error = AmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents an account balance in minor units.
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance(u64);

impl Balance {
    pub fn new(minor_units: u64) -> Self {
        Self(minor_units)
    }

    /// Balance that a BIGINT column can hold
    pub fn try_new(minor_units: u64) -> Result<Self, AmountError> {
        if minor_units > MAX_MINOR_UNITS {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor_units))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }

    /// Check if balance is sufficient for withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor_units()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.0
            .checked_add(amount.minor_units())
            .filter(|v| *v <= MAX_MINOR_UNITS)
            .map(Balance)
            .ok_or(AmountError::Overflow)
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        self.0
            .checked_sub(amount.minor_units())
            .map(Balance)
            .ok_or(AmountError::NotPositive)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
