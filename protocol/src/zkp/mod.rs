//! # Zero-Knowledge Proof Module
//!
//! Proof construction and local verification for confidential balances.
//! Everything here is synchronous and free of I/O: proofs are pure functions
//! of their inputs plus fresh randomness, so any number of them can be built
//! in parallel without coordination.
//!
//! ## Architecture
//!
//! ```text
//! range.rs            — 64-bit Bulletproof range proofs (674 bytes on the wire)
//! validity.rs         — ciphertext validity Sigma proof (96 bytes)
//! equality.rs         — ciphertext/commitment equality Sigma proof (192 bytes)
//! pubkey_validity.rs  — knowledge of an ElGamal secret key (64 bytes)
//! transfer.rs         — the 4-part transfer bundle and its local verifier
//! ```
//!
//! ## Proof modes
//!
//! Each builder takes a [`ProofMode`]. In `LocalOnly` it returns just the
//! proof. In the two ZK-program modes it also returns the instruction that
//! asks the on-chain verifier to check it, and flags the result as requiring
//! that external verifier. Deciding whether the verifier actually exists is
//! the orchestrator's job (see `transfer::manager`), not the builders'.

pub mod equality;
pub mod pubkey_validity;
pub mod range;
pub mod transfer;
pub mod validity;

pub use equality::{build_equality_proof, verify_equality_proof_local, EqualityProof};
pub use pubkey_validity::{
    build_pubkey_validity_proof, verify_pubkey_validity_proof_local, PubkeyValidityProof,
};
pub use range::{build_range_proof, verify_range_proof_local, RangeProof, RangeProofOutput};
pub use transfer::{
    build_transfer_proof, verify_transfer_local, TransferProofBundle, TransferProofInput,
    TransferProofOutput,
};
pub use validity::{
    build_validity_proof, verify_validity_proof_local, ValidityProof, ValidityProofOutput,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ZK_PROOF_FEATURE_ID, ZK_PROOF_PROGRAM_ID};
use crate::crypto::InputError;
use crate::instruction::Address;

// ---------------------------------------------------------------------------
// Proof mode
// ---------------------------------------------------------------------------

/// Where an on-chain verifier lives and which feature gate turns it on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZkVerifier {
    pub program_id: Address,
    pub feature_id: Address,
}

impl Default for ZkVerifier {
    fn default() -> Self {
        Self {
            program_id: ZK_PROOF_PROGRAM_ID,
            feature_id: ZK_PROOF_FEATURE_ID,
        }
    }
}

/// How the proofs of one operation get verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "verifier", rename_all = "snake_case")]
pub enum ProofMode {
    /// Verified by this process before the instructions are handed out.
    LocalOnly,
    /// Verified by the on-chain program; fails if it is unavailable.
    ZkProgramOnly(ZkVerifier),
    /// On-chain when the feature gate is active, otherwise local.
    ZkProgramWithFallback(ZkVerifier),
}

impl ProofMode {
    pub fn zk_program() -> Self {
        ProofMode::ZkProgramOnly(ZkVerifier::default())
    }

    pub fn with_fallback() -> Self {
        ProofMode::ZkProgramWithFallback(ZkVerifier::default())
    }

    /// The verifier proof instructions are addressed to, if any.
    pub fn verifier(&self) -> Option<&ZkVerifier> {
        match self {
            ProofMode::LocalOnly => None,
            ProofMode::ZkProgramOnly(v) | ProofMode::ZkProgramWithFallback(v) => Some(v),
        }
    }

    pub fn requires_external_verifier(&self) -> bool {
        self.verifier().is_some()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while building a proof.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("proof generation failed: {0}")]
    Generation(String),
}

/// Why a proof did not verify. Returned inside [`LocalVerification`], never
/// raised, so callers checking many proofs can keep going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Invalid proof size: expected {expected} bytes, got {actual}")]
    InvalidProofSize { expected: usize, actual: usize },

    #[error("malformed proof: {0}")]
    Malformed(&'static str),

    #[error("proof verification failed: {0}")]
    Failed(String),
}

/// Outcome of verifying a proof in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVerification {
    pub valid: bool,
    /// Always true: local verification is the fallback path by definition.
    pub used_fallback: bool,
    pub error: Option<VerifyError>,
}

impl LocalVerification {
    pub fn ok() -> Self {
        Self {
            valid: true,
            used_fallback: true,
            error: None,
        }
    }

    pub fn failed(error: VerifyError) -> Self {
        Self {
            valid: false,
            used_fallback: true,
            error: Some(error),
        }
    }

    /// Chain verifications, keeping the first failure.
    pub fn and_then(self, next: impl FnOnce() -> LocalVerification) -> LocalVerification {
        if self.valid {
            next()
        } else {
            self
        }
    }
}

impl From<Result<(), VerifyError>> for LocalVerification {
    fn from(result: Result<(), VerifyError>) -> Self {
        match result {
            Ok(()) => LocalVerification::ok(),
            Err(e) => LocalVerification::failed(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixed-size proof bytes
// ---------------------------------------------------------------------------

/// Declares a fixed-length proof newtype with length-checked parsing, hex
/// `Debug`, and hex serde.
macro_rules! proof_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, $crate::zkp::VerifyError> {
                let array: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| $crate::zkp::VerifyError::InvalidProofSize {
                            expected: $len,
                            actual: bytes.len(),
                        })?;
                Ok(Self(array))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_bytes(&self) -> [u8; $len] {
                self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[..]))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(&self.0[..]))
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
                let bytes = hex::decode(raw).map_err(serde::de::Error::custom)?;
                Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use proof_bytes;
