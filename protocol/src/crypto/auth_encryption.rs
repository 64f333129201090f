//! # Decryptable Balances (AES-256-GCM)
//!
//! An ElGamal balance can only be decrypted back to an integer with a
//! discrete-log search, which is hopeless for large values. The owner
//! therefore keeps a second copy of the balance encrypted under a symmetric
//! [`AeKey`]: cheap to decrypt, meaningless to everyone else.
//!
//! ## Wire format
//!
//! A [`DecryptableBalance`] is 36 bytes:
//!
//! ```text
//! nonce (12) || AES-GCM(amount as u64 LE) (8) || tag (16)
//! ```
//!
//! Nonces are random 96-bit values from the OS RNG. One key encrypts at most
//! one balance update per operation, far below the birthday bound.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::elgamal::ElGamalSecretKey;
use crate::config::{AES_NONCE_LENGTH, DECRYPTABLE_BALANCE_LENGTH};

const AE_KEY_CONTEXT: &str = "cloak-protocol 2026-01 decryptable balance key";

/// Errors from the symmetric layer.
///
/// Kept vague on purpose: "wrong key" and "tampered ciphertext" look the same.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key or corrupted ciphertext")]
    DecryptFailed,

    #[error("invalid decryptable balance length: expected {DECRYPTABLE_BALANCE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
}

/// Symmetric key for decryptable balances.
#[derive(Clone)]
pub struct AeKey([u8; 32]);

impl AeKey {
    /// Derive the key bound to an ElGamal secret, so owners keep one secret.
    pub fn derive(secret: &ElGamalSecretKey) -> Self {
        Self(blake3::derive_key(AE_KEY_CONTEXT, &secret.to_bytes()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn encrypt(&self, amount: u64) -> Result<DecryptableBalance, EncryptionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.0).map_err(|_| EncryptionError::EncryptFailed)?;

        let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, amount.to_le_bytes().as_ref())
            .map_err(|_| EncryptionError::EncryptFailed)?;

        let mut out = [0u8; DECRYPTABLE_BALANCE_LENGTH];
        out[..AES_NONCE_LENGTH].copy_from_slice(&nonce_bytes);
        out[AES_NONCE_LENGTH..].copy_from_slice(&sealed);
        Ok(DecryptableBalance(out))
    }

    pub fn decrypt(&self, balance: &DecryptableBalance) -> Result<u64, EncryptionError> {
        let (nonce_bytes, sealed) = balance.0.split_at(AES_NONCE_LENGTH);
        let cipher = Aes256Gcm::new_from_slice(&self.0).map_err(|_| EncryptionError::DecryptFailed)?;
        let plain = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| EncryptionError::DecryptFailed)?;
        let amount: [u8; 8] = plain
            .as_slice()
            .try_into()
            .map_err(|_| EncryptionError::DecryptFailed)?;
        Ok(u64::from_le_bytes(amount))
    }
}

/// A balance only its owner can read.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptableBalance(#[serde(with = "balance_hex")] [u8; DECRYPTABLE_BALANCE_LENGTH]);

impl DecryptableBalance {
    pub fn to_bytes(&self) -> [u8; DECRYPTABLE_BALANCE_LENGTH] {
        self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let array: [u8; DECRYPTABLE_BALANCE_LENGTH] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl std::fmt::Debug for DecryptableBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecryptableBalance({})", hex::encode(self.0))
    }
}

mod balance_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::config::DECRYPTABLE_BALANCE_LENGTH;

    pub fn serialize<S: Serializer>(
        bytes: &[u8; DECRYPTABLE_BALANCE_LENGTH],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; DECRYPTABLE_BALANCE_LENGTH], D::Error> {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(raw).map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("decryptable balance must be 36 bytes"))
    }
}
