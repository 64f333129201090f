//! # Ledger Instructions
//!
//! The core never talks to the ledger directly when it produces work: it
//! emits [`Instruction`] values and hands them to whatever client submits
//! transactions. An instruction is the usual triple of program address,
//! ordered account list, and opaque data bytes.
//!
//! ```text
//! mod.rs    — Address, AccountMeta, Instruction, transaction size estimate
//! token.rs  — confidential-transfer extension instructions
//! proof.rs  — proof verification instructions for the ZK program
//! ```

pub mod proof;
pub mod token;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced while parsing an [`Address`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 address: {0}")]
    InvalidBase58(String),

    #[error("invalid address length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 32-byte ledger address, rendered in base58.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; 32] {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Instruction
// ---------------------------------------------------------------------------

/// How an instruction touches an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    Readonly,
    Writable,
    ReadonlySigner,
    WritableSigner,
}

impl AccountRole {
    pub fn is_signer(self) -> bool {
        matches!(self, AccountRole::ReadonlySigner | AccountRole::WritableSigner)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, AccountRole::Writable | AccountRole::WritableSigner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMeta {
    pub address: Address,
    pub role: AccountRole,
}

impl AccountMeta {
    pub fn readonly(address: Address) -> Self {
        Self {
            address,
            role: AccountRole::Readonly,
        }
    }

    pub fn writable(address: Address) -> Self {
        Self {
            address,
            role: AccountRole::Writable,
        }
    }

    pub fn signer(address: Address) -> Self {
        Self {
            address,
            role: AccountRole::ReadonlySigner,
        }
    }
}

/// A single ledger instruction, ready for the external submission client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn new(program_id: Address, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }

    /// First byte of the data, which every program here uses as its
    /// instruction discriminator.
    pub fn tag(&self) -> Option<u8> {
        self.data.first().copied()
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Transaction size
// ---------------------------------------------------------------------------

const SIGNATURE_LENGTH: usize = 64;
const MESSAGE_HEADER_LENGTH: usize = 3;
const BLOCKHASH_LENGTH: usize = 32;

fn compact_len(n: usize) -> usize {
    match n {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        _ => 3,
    }
}

/// Serialized size of a legacy transaction carrying `instructions`.
///
/// Counts one signature per distinct signer (at least one, the fee payer),
/// the deduplicated account table including program ids, the recent
/// blockhash, and each compiled instruction.
pub fn estimate_transaction_size(instructions: &[Instruction]) -> usize {
    let mut keys: HashSet<Address> = HashSet::new();
    let mut signers: HashSet<Address> = HashSet::new();

    for ix in instructions {
        keys.insert(ix.program_id);
        for meta in &ix.accounts {
            keys.insert(meta.address);
            if meta.role.is_signer() {
                signers.insert(meta.address);
            }
        }
    }
    let num_signatures = signers.len().max(1);
    // The fee payer is an extra key when no instruction already names a signer.
    let num_keys = keys.len() + usize::from(signers.is_empty());

    let compiled: usize = instructions
        .iter()
        .map(|ix| {
            1 + compact_len(ix.accounts.len())
                + ix.accounts.len()
                + compact_len(ix.data.len())
                + ix.data.len()
        })
        .sum();

    compact_len(num_signatures)
        + num_signatures * SIGNATURE_LENGTH
        + MESSAGE_HEADER_LENGTH
        + compact_len(num_keys)
        + num_keys * 32
        + BLOCKHASH_LENGTH
        + compact_len(instructions.len())
        + compiled
}
