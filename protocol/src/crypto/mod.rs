//! # Key & Commitment Primitives
//!
//! Everything else in the crate is built from the handful of objects in this
//! module: Pedersen commitments, twisted ElGamal keys and ciphertexts over
//! Ristretto, and the authenticated "decryptable balance" the account owner
//! keeps next to the encrypted one.
//!
//! - **pedersen** — generators `G`/`H`, clamped random openings, `commit`.
//! - **elgamal** — keypairs, encryption, homomorphic arithmetic, decryption.
//! - **auth_encryption** — AES-256-GCM encrypted u64 balances.
//! - **transcript** — Merlin transcript helpers shared by every proof.
//!
//! All functions here are pure. Input validation happens up front and is
//! never "corrected" silently: a zero blinding factor or a bad point encoding
//! is returned to the caller as an [`InputError`].

pub mod auth_encryption;
pub mod elgamal;
pub mod pedersen;
pub mod transcript;

pub use auth_encryption::{AeKey, DecryptableBalance, EncryptionError};
pub use elgamal::{Ciphertext, DecryptError, ElGamalKeypair, ElGamalPubkey, ElGamalSecretKey};
pub use pedersen::{commit, random_scalar, PedersenCommitment};

use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use thiserror::Error;

/// Input validation failures. Always raised before any proof work starts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Amount must be in range [0, 2^64)")]
    AmountOutOfRange,

    #[error("invalid randomness: blinding factors must be non-zero scalars")]
    InvalidRandomness,

    #[error("malformed point encoding: {0}")]
    InvalidPoint(&'static str),

    #[error("malformed scalar encoding: {0}")]
    InvalidScalar(&'static str),

    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: u64, requested: u64 },

    #[error("inconsistent balance: {0}")]
    BalanceMismatch(&'static str),

    #[error("invalid ui amount: {0}")]
    InvalidUiAmount(String),
}

/// Narrow an arbitrary integer to a valid 64-bit amount.
///
/// Callers that accept amounts from outside the type system (JSON, UI
/// fields, arithmetic in a wider type) go through here.
pub fn check_amount(raw: i128) -> Result<u64, InputError> {
    u64::try_from(raw).map_err(|_| InputError::AmountOutOfRange)
}

/// Convert a decimal UI amount such as `"12.5"` into base units.
pub fn parse_ui_amount(ui: &str, decimals: u8) -> Result<u64, InputError> {
    let ui = ui.trim();
    if ui.starts_with('-') {
        return Err(InputError::AmountOutOfRange);
    }
    let (whole, frac) = match ui.split_once('.') {
        Some((w, f)) => (w, f),
        None => (ui, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(InputError::InvalidUiAmount(ui.to_string()));
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(InputError::InvalidUiAmount(ui.to_string()));
    }
    if frac.len() > decimals as usize {
        return Err(InputError::InvalidUiAmount(format!(
            "{ui} has more than {decimals} decimal places"
        )));
    }

    let mut digits = String::with_capacity(whole.len() + decimals as usize);
    digits.push_str(whole);
    digits.push_str(frac);
    for _ in frac.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    // Anything past 39 digits overflows i128 as well; still a range error.
    let raw: i128 = digits.parse().map_err(|_| InputError::AmountOutOfRange)?;
    check_amount(raw)
}

/// Decode a 32-byte compressed Ristretto point.
pub fn decode_point(bytes: &[u8]) -> Result<RistrettoPoint, InputError> {
    let compressed =
        CompressedRistretto::from_slice(bytes).map_err(|_| InputError::InvalidLength {
            what: "point",
            expected: 32,
            actual: bytes.len(),
        })?;
    compressed
        .decompress()
        .ok_or(InputError::InvalidPoint("not a valid ristretto encoding"))
}

/// Decode a canonical 32-byte scalar.
pub fn decode_scalar(bytes: &[u8]) -> Result<Scalar, InputError> {
    let array: [u8; 32] = bytes.try_into().map_err(|_| InputError::InvalidLength {
        what: "scalar",
        expected: 32,
        actual: bytes.len(),
    })?;
    Option::from(Scalar::from_canonical_bytes(array))
        .ok_or(InputError::InvalidScalar("not reduced modulo the group order"))
}
