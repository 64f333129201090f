//! Requests and results of the confidential transfer manager.

use serde::{Deserialize, Serialize};

use crate::crypto::{Ciphertext, DecryptableBalance, ElGamalKeypair, ElGamalPubkey};
use crate::instruction::token::TokenAccountKeys;
use crate::instruction::{Address, Instruction};
use crate::zkp::{
    EqualityProof, ProofMode, PubkeyValidityProof, RangeProof, TransferProofBundle, ValidityProof,
};

/// What to submit, in what order, and what the caller should know about it.
///
/// `proof_instructions` is non-empty only when the proofs were too large to
/// ride along: submit them first (they verify into context-state accounts),
/// then `instructions`. Otherwise `instructions` is one self-contained
/// transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
    pub instructions: Vec<Instruction>,
    pub proof_instructions: Vec<Instruction>,
    pub warnings: Vec<String>,
    pub requires_external_verifier: bool,
}

impl OperationPlan {
    pub fn is_split(&self) -> bool {
        !self.proof_instructions.is_empty()
    }

    /// Every instruction in submission order.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.proof_instructions.iter().chain(self.instructions.iter())
    }
}

// ---------------------------------------------------------------------------
// Configure
// ---------------------------------------------------------------------------

pub struct ConfigureAccountRequest<'a> {
    pub keys: TokenAccountKeys,
    pub elgamal_keypair: &'a ElGamalKeypair,
    /// Zero, encrypted under the owner's `AeKey`.
    pub decryptable_zero_balance: DecryptableBalance,
    /// Defaults to `DEFAULT_MAX_PENDING_BALANCE_CREDITS`.
    pub maximum_pending_balance_credit_counter: Option<u64>,
    pub mode: ProofMode,
}

#[derive(Debug, Clone)]
pub struct ConfigureAccountOutput {
    pub plan: OperationPlan,
    pub pubkey_validity_proof: PubkeyValidityProof,
}

// ---------------------------------------------------------------------------
// Deposit
// ---------------------------------------------------------------------------

pub struct DepositRequest<'a> {
    pub keys: TokenAccountKeys,
    /// The account's ElGamal public key; the deposit is encrypted to it.
    pub elgamal_pubkey: &'a ElGamalPubkey,
    pub amount: u64,
    pub decimals: u8,
    pub mode: ProofMode,
}

#[derive(Debug, Clone)]
pub struct DepositOutput {
    pub plan: OperationPlan,
    pub encrypted_amount: Ciphertext,
    pub validity_proof: ValidityProof,
}

// ---------------------------------------------------------------------------
// Withdraw
// ---------------------------------------------------------------------------

pub struct WithdrawRequest<'a> {
    pub keys: TokenAccountKeys,
    pub elgamal_keypair: &'a ElGamalKeypair,
    pub amount: u64,
    pub decimals: u8,
    pub current_balance: Ciphertext,
    pub current_decryptable_balance: DecryptableBalance,
    /// `current - amount`, encrypted under the owner's `AeKey`.
    pub new_decryptable_balance: DecryptableBalance,
    pub mode: ProofMode,
}

#[derive(Debug, Clone)]
pub struct WithdrawOutput {
    pub plan: OperationPlan,
    pub new_balance: Ciphertext,
    pub equality_proof: EqualityProof,
    pub range_proof: RangeProof,
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

pub struct TransferRequest<'a> {
    /// Source token account, its mint, and its owner.
    pub keys: TokenAccountKeys,
    pub destination: Address,
    pub source_keypair: &'a ElGamalKeypair,
    pub destination_pubkey: &'a ElGamalPubkey,
    pub amount: u64,
    pub source_balance: Ciphertext,
    pub current_decryptable_balance: DecryptableBalance,
    pub new_decryptable_balance: DecryptableBalance,
    pub mode: ProofMode,
}

#[derive(Debug, Clone)]
pub struct TransferOutput {
    pub plan: OperationPlan,
    pub bundle: TransferProofBundle,
}

// ---------------------------------------------------------------------------
// Apply pending balance
// ---------------------------------------------------------------------------

pub struct ApplyPendingBalanceRequest {
    pub keys: TokenAccountKeys,
    pub expected_pending_balance_credit_counter: u64,
    pub new_decryptable_available_balance: DecryptableBalance,
}
