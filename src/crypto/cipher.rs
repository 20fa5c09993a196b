//! Deterministic identifier cipher
//!
//! Synthetic-IV construction over AES-256-GCM: the nonce is derived from the
//! plaintext with HMAC-SHA256, so equal plaintexts produce equal ciphertexts.
//! Equality lookups work on the ciphertext alone; the price is that equal
//! identifiers are visibly equal at rest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Master key length in bytes
pub const KEY_LEN: usize = 32;

const MAC_KEY_LABEL: &[u8] = b"identifier-siv/mac";
const ENC_KEY_LABEL: &[u8] = b"identifier-siv/enc";

/// Ciphertext of a normalized identifier, as stored in the lookup columns
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SealedIdentifier(Vec<u8>);

impl SealedIdentifier {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SealedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = &self.0[..self.0.len().min(4)];
        write!(f, "SealedIdentifier({}…, {} bytes)", hex::encode(prefix), self.0.len())
    }
}

/// Cipher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CipherError {
    #[error("Invalid key: expected 32 bytes encoded as hex")]
    InvalidKey,

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed")]
    Decrypt,
}

/// Deterministic transform applied to identifiers at link-time and lookup-time
pub trait DeterministicCipher: Send + Sync {
    /// Encrypt a normalized identifier. Same input and key, same output.
    fn seal(&self, plaintext: &str) -> Result<SealedIdentifier, CipherError>;

    /// Decrypt and authenticate a sealed identifier
    fn open(&self, sealed: &SealedIdentifier) -> Result<String, CipherError>;
}

/// AES-256-GCM with an HMAC-SHA256 synthetic IV
#[derive(Clone)]
pub struct SivCipher {
    mac: HmacSha256,
    aead: Aes256Gcm,
}

impl SivCipher {
    /// Build the cipher from a 32-byte master key.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKey);
        }

        let mac_key = derive_subkey(key, MAC_KEY_LABEL)?;
        let enc_key = derive_subkey(key, ENC_KEY_LABEL)?;

        let mac = <HmacSha256 as Mac>::new_from_slice(&mac_key)
            .map_err(|_| CipherError::InvalidKey)?;
        let aead = <Aes256Gcm as KeyInit>::new_from_slice(&enc_key)
            .map_err(|_| CipherError::InvalidKey)?;

        Ok(Self { mac, aead })
    }

    /// Build the cipher from a hex-encoded master key (64 hex characters).
    pub fn from_hex(key: &str) -> Result<Self, CipherError> {
        let bytes = hex::decode(key.trim()).map_err(|_| CipherError::InvalidKey)?;
        Self::new(&bytes)
    }

    fn synthetic_iv(&self, plaintext: &[u8]) -> [u8; NONCE_LEN] {
        let mut mac = self.mac.clone();
        mac.update(plaintext);
        let tag = mac.finalize().into_bytes();

        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&tag[..NONCE_LEN]);
        iv
    }
}

impl DeterministicCipher for SivCipher {
    fn seal(&self, plaintext: &str) -> Result<SealedIdentifier, CipherError> {
        let iv = self.synthetic_iv(plaintext.as_bytes());
        let ciphertext = self
            .aead
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CipherError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&iv);
        sealed.extend_from_slice(&ciphertext);
        Ok(SealedIdentifier(sealed))
    }

    fn open(&self, sealed: &SealedIdentifier) -> Result<String, CipherError> {
        let bytes = sealed.as_bytes();
        if bytes.len() <= NONCE_LEN {
            return Err(CipherError::Decrypt);
        }
        let (iv, ciphertext) = bytes.split_at(NONCE_LEN);

        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        // The IV must be the one this key derives for the plaintext
        let mut mac = self.mac.clone();
        mac.update(&plaintext);
        mac.verify_truncated_left(iv)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Decrypt)
    }
}

fn derive_subkey(master: &[u8], label: &[u8]) -> Result<[u8; KEY_LEN], CipherError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(master).map_err(|_| CipherError::InvalidKey)?;
    mac.update(label);
    let out = mac.finalize().into_bytes();

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&out[..KEY_LEN]);
    Ok(key)
}
