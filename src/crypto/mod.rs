//! Crypto module
//!
//! Pseudonymization of recipient identifiers at rest.

mod cipher;

pub use cipher::{CipherError, DeterministicCipher, SealedIdentifier, SivCipher, KEY_LEN};
