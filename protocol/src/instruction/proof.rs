//! Proof verification instructions for the on-chain ZK program.
//!
//! ```text
//! data = [kind] || statement || proof
//!
//! kind  statement                                     proof
//! 3     pubkey(32) ciphertext(64) commitment(32)      equality (192)
//! 4     pubkey(32)                                    pubkey validity (64)
//! 6     commitment(32)                                range (674)
//! 9     pubkey(32) ciphertext(64)                     validity (96)
//! ```
//!
//! With a context account the verified statement is stored there so a
//! later token instruction in another transaction can reference it. Without
//! one the token instruction has to sit in the same transaction and point
//! at the proof through the instructions sysvar.

use super::{AccountMeta, Address, Instruction};
use crate::crypto::{Ciphertext, ElGamalPubkey, PedersenCommitment};
use crate::zkp::{EqualityProof, PubkeyValidityProof, RangeProof, ValidityProof};

/// Verifier instruction discriminators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProofInstruction {
    VerifyCiphertextCommitmentEquality = 3,
    VerifyPubkeyValidity = 4,
    VerifyRangeProofU64 = 6,
    VerifyCiphertextValidity = 9,
}

impl ProofInstruction {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            3 => Some(Self::VerifyCiphertextCommitmentEquality),
            4 => Some(Self::VerifyPubkeyValidity),
            6 => Some(Self::VerifyRangeProofU64),
            9 => Some(Self::VerifyCiphertextValidity),
            _ => None,
        }
    }
}

fn build(program_id: Address, kind: ProofInstruction, parts: &[&[u8]], context: Option<Address>) -> Instruction {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut data = Vec::with_capacity(len);
    data.push(kind as u8);
    for part in parts {
        data.extend_from_slice(part);
    }
    let accounts = context.map(AccountMeta::writable).into_iter().collect();
    Instruction::new(program_id, accounts, data)
}

pub fn verify_ciphertext_commitment_equality(
    program_id: Address,
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
    proof: &EqualityProof,
    context: Option<Address>,
) -> Instruction {
    build(
        program_id,
        ProofInstruction::VerifyCiphertextCommitmentEquality,
        &[
            &pubkey.to_bytes(),
            &ciphertext.to_bytes(),
            &commitment.to_bytes(),
            proof.as_bytes(),
        ],
        context,
    )
}

pub fn verify_pubkey_validity(
    program_id: Address,
    pubkey: &ElGamalPubkey,
    proof: &PubkeyValidityProof,
    context: Option<Address>,
) -> Instruction {
    build(
        program_id,
        ProofInstruction::VerifyPubkeyValidity,
        &[&pubkey.to_bytes(), proof.as_bytes()],
        context,
    )
}

pub fn verify_range_proof(
    program_id: Address,
    commitment: &PedersenCommitment,
    proof: &RangeProof,
    context: Option<Address>,
) -> Instruction {
    build(
        program_id,
        ProofInstruction::VerifyRangeProofU64,
        &[&commitment.to_bytes(), proof.as_bytes()],
        context,
    )
}

pub fn verify_ciphertext_validity(
    program_id: Address,
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
    proof: &ValidityProof,
    context: Option<Address>,
) -> Instruction {
    build(
        program_id,
        ProofInstruction::VerifyCiphertextValidity,
        &[&pubkey.to_bytes(), &ciphertext.to_bytes(), proof.as_bytes()],
        context,
    )
}

/// Re-target a verifier instruction at a context-state account.
pub fn with_context(mut instruction: Instruction, context: Address) -> Instruction {
    instruction.accounts = vec![AccountMeta::writable(context)];
    instruction
}
