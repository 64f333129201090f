//! # Transfer Proofs
//!
//! A confidential transfer of `T` out of a source balance holding `S`
//! produces the artefacts the ledger needs:
//!
//! ```text
//!   encrypted_transfer_amount   Enc_src(T; r)             64 bytes
//!   equality_proof              new balance == Com(S-T)   192 bytes
//!   validity_proof              Enc_dst(T; r) well formed 96 bytes
//!   range_proof                 Com(S-T) in [0, 2^64)     674 bytes
//!   amount_range_proof          T*G + r*H in [0, 2^64)    674 bytes
//! ```
//!
//! Both encryptions of `T` share one randomness `r`, hence one commitment
//! `T*G + r*H`; they differ only in the decrypt handle. The ledger subtracts
//! the source-side ciphertext from the source balance and credits the
//! destination-side ciphertext, so what leaves one account is provably what
//! arrives at the other.
//!
//! The remaining balance `S - T` is a homomorphic result nobody knows the
//! opening of, so its range proof is made over a fresh commitment and the
//! equality proof ties that commitment to the new balance.
//!
//! `T` needs its own range proof. The validity proof only shows the
//! destination ciphertext is well formed, and a well-formed encryption of
//! `-5` would raise the sender's balance and drain the recipient's. The
//! shared commitment `T*G + r*H` opens with `r`, so it is range-proven
//! directly.

use curve25519_dalek::scalar::Scalar;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::equality::{prove_equality, verify_equality, EqualityProof};
use super::range::{prove_range, verify_range, RangeProof};
use super::validity::{prove_validity, verify_validity, ValidityProof};
use super::{LocalVerification, ProofError, ProofMode, VerifyError};
use crate::crypto::pedersen::{commit_unchecked, ensure_nonzero, random_scalar};
use crate::crypto::{Ciphertext, ElGamalKeypair, ElGamalPubkey, InputError, PedersenCommitment};
use crate::instruction::{proof as proof_ix, Instruction};

/// Witness and statement for one transfer.
pub struct TransferProofInput<'a> {
    /// The source account's current encrypted available balance.
    pub source_balance: &'a Ciphertext,
    /// Plaintext of `source_balance`; checked against it.
    pub source_available: u64,
    pub transfer_amount: u64,
    pub source_keypair: &'a ElGamalKeypair,
    pub dest_pubkey: &'a ElGamalPubkey,
    /// Randomness for the transfer-amount encryptions.
    pub source_randomness: &'a Scalar,
}

/// Everything a transfer instruction carries, plus the values derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProofBundle {
    pub encrypted_transfer_amount: Ciphertext,
    pub equality_proof: EqualityProof,
    pub validity_proof: ValidityProof,
    pub range_proof: RangeProof,
    pub amount_range_proof: RangeProof,
    pub new_source_balance: Ciphertext,
    pub dest_ciphertext: Ciphertext,
    pub new_balance_commitment: PedersenCommitment,
}

/// Result of [`build_transfer_proof`].
#[derive(Debug, Clone)]
pub struct TransferProofOutput {
    pub bundle: TransferProofBundle,
    pub requires_external_verifier: bool,
    /// Equality, validity, balance range and amount range verifier
    /// instructions, in that order. Empty in `LocalOnly` mode.
    pub verifier_instructions: Vec<Instruction>,
}

/// Build the transfer bundle.
///
/// Every input check (zero randomness, inconsistent source balance,
/// insufficient funds) runs before any proof is attempted.
pub fn build_transfer_proof(
    input: TransferProofInput<'_>,
    mode: &ProofMode,
) -> Result<TransferProofOutput, ProofError> {
    ensure_nonzero(input.source_randomness)?;

    if !input
        .source_keypair
        .secret()
        .decrypts_to(input.source_balance, input.source_available)
    {
        return Err(InputError::BalanceMismatch(
            "source balance ciphertext does not decrypt to the stated available balance",
        )
        .into());
    }

    let remaining = input
        .source_available
        .checked_sub(input.transfer_amount)
        .ok_or(InputError::InsufficientBalance {
            available: input.source_available,
            requested: input.transfer_amount,
        })?;

    let r = input.source_randomness;
    let source_pubkey = input.source_keypair.pubkey();

    let encrypted_transfer_amount = source_pubkey.encrypt_unchecked(input.transfer_amount, r);
    let dest_ciphertext = input.dest_pubkey.encrypt_unchecked(input.transfer_amount, r);
    let new_source_balance = input.source_balance - &encrypted_transfer_amount;

    let opening = random_scalar();
    let new_balance_commitment = commit_unchecked(remaining, &opening);

    let equality_proof = prove_equality(
        input.source_keypair,
        &new_source_balance,
        &new_balance_commitment,
        remaining,
        &opening,
    )?;
    let validity_proof = prove_validity(&dest_ciphertext, input.dest_pubkey, input.transfer_amount, r)?;
    let range_proof = prove_range(remaining, &opening, &new_balance_commitment)?;
    let amount_range_proof = prove_range(
        input.transfer_amount,
        r,
        &dest_ciphertext.pedersen_commitment(),
    )?;

    let bundle = TransferProofBundle {
        encrypted_transfer_amount,
        equality_proof,
        validity_proof,
        range_proof,
        amount_range_proof,
        new_source_balance,
        dest_ciphertext,
        new_balance_commitment,
    };

    let verifier_instructions = match mode.verifier() {
        Some(v) => verifier_instructions(v.program_id, &bundle, source_pubkey, input.dest_pubkey),
        None => Vec::new(),
    };

    debug!(
        external = mode.requires_external_verifier(),
        "transfer proof bundle built"
    );

    Ok(TransferProofOutput {
        bundle,
        requires_external_verifier: mode.requires_external_verifier(),
        verifier_instructions,
    })
}

fn verifier_instructions(
    program_id: crate::instruction::Address,
    bundle: &TransferProofBundle,
    source_pubkey: &ElGamalPubkey,
    dest_pubkey: &ElGamalPubkey,
) -> Vec<Instruction> {
    vec![
        proof_ix::verify_ciphertext_commitment_equality(
            program_id,
            source_pubkey,
            &bundle.new_source_balance,
            &bundle.new_balance_commitment,
            &bundle.equality_proof,
            None,
        ),
        proof_ix::verify_ciphertext_validity(
            program_id,
            dest_pubkey,
            &bundle.dest_ciphertext,
            &bundle.validity_proof,
            None,
        ),
        proof_ix::verify_range_proof(
            program_id,
            &bundle.new_balance_commitment,
            &bundle.range_proof,
            None,
        ),
        proof_ix::verify_range_proof(
            program_id,
            &bundle.dest_ciphertext.pedersen_commitment(),
            &bundle.amount_range_proof,
            None,
        ),
    ]
}

/// Check a bundle the way the on-chain verifier would.
///
/// Recomputes the derived ciphertexts from `source_balance` before touching
/// any proof, then checks equality, validity, the transfer amount's range
/// and the remaining balance's range in that order.
pub fn verify_transfer_local(
    bundle: &TransferProofBundle,
    source_balance: &Ciphertext,
    source_pubkey: &ElGamalPubkey,
    dest_pubkey: &ElGamalPubkey,
) -> LocalVerification {
    check_transfer(bundle, source_balance, source_pubkey, dest_pubkey).into()
}

fn check_transfer(
    bundle: &TransferProofBundle,
    source_balance: &Ciphertext,
    source_pubkey: &ElGamalPubkey,
    dest_pubkey: &ElGamalPubkey,
) -> Result<(), VerifyError> {
    if bundle.dest_ciphertext.commitment != bundle.encrypted_transfer_amount.commitment {
        return Err(VerifyError::Failed(
            "source and destination transfer amounts do not share a commitment".into(),
        ));
    }
    if source_balance - &bundle.encrypted_transfer_amount != bundle.new_source_balance {
        return Err(VerifyError::Failed(
            "new source balance is not the old balance minus the transfer".into(),
        ));
    }

    verify_equality(
        &bundle.equality_proof,
        source_pubkey,
        &bundle.new_source_balance,
        &bundle.new_balance_commitment,
    )?;
    verify_validity(&bundle.validity_proof, dest_pubkey, &bundle.dest_ciphertext)?;
    verify_range(
        &bundle.amount_range_proof,
        &bundle.dest_ciphertext.pedersen_commitment(),
    )?;
    verify_range(&bundle.range_proof, &bundle.new_balance_commitment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pedersen::{generator_g, generator_h};
    use crate::zkp::validity::validity_sigma;

    struct Accounts {
        source: ElGamalKeypair,
        dest: ElGamalKeypair,
        balance: Ciphertext,
    }

    fn accounts(available: u64) -> Accounts {
        let source = ElGamalKeypair::generate();
        let dest = ElGamalKeypair::generate();
        let (balance, _) = source.pubkey().encrypt(available);
        Accounts {
            source,
            dest,
            balance,
        }
    }

    fn transfer(a: &Accounts, available: u64, amount: u64) -> Result<TransferProofOutput, ProofError> {
        build_transfer_proof(
            TransferProofInput {
                source_balance: &a.balance,
                source_available: available,
                transfer_amount: amount,
                source_keypair: &a.source,
                dest_pubkey: a.dest.pubkey(),
                source_randomness: &random_scalar(),
            },
            &ProofMode::LocalOnly,
        )
    }

    #[test]
    fn value_is_conserved() {
        let a = accounts(1_000);
        let out = transfer(&a, 1_000, 250).unwrap();
        let bundle = &out.bundle;

        assert_eq!(a.source.secret().decrypt(&bundle.new_source_balance), Ok(750));
        assert_eq!(a.dest.secret().decrypt(&bundle.dest_ciphertext), Ok(250));
        assert_eq!(a.source.secret().decrypt(&bundle.encrypted_transfer_amount), Ok(250));
    }

    #[test]
    fn bundle_verifies_locally() {
        let a = accounts(500);
        let out = transfer(&a, 500, 125).unwrap();
        let result = verify_transfer_local(&out.bundle, &a.balance, a.source.pubkey(), a.dest.pubkey());
        assert!(result.valid, "{:?}", result.error);
        assert!(out.verifier_instructions.is_empty());
        assert!(!out.requires_external_verifier);
    }

    #[test]
    fn entire_balance_can_move() {
        let a = accounts(42);
        let out = transfer(&a, 42, 42).unwrap();
        assert_eq!(a.source.secret().decrypt(&out.bundle.new_source_balance), Ok(0));
        assert!(verify_transfer_local(&out.bundle, &a.balance, a.source.pubkey(), a.dest.pubkey()).valid);
    }

    #[test]
    fn overdraft_rejected_before_proving() {
        let a = accounts(10);
        assert_eq!(
            transfer(&a, 10, 11).unwrap_err(),
            ProofError::Input(InputError::InsufficientBalance {
                available: 10,
                requested: 11
            })
        );
    }

    #[test]
    fn stated_balance_must_match_ciphertext() {
        let a = accounts(10);
        assert!(matches!(
            transfer(&a, 20, 5),
            Err(ProofError::Input(InputError::BalanceMismatch(_)))
        ));
    }

    #[test]
    fn bundle_sizes() {
        let a = accounts(9);
        let b = transfer(&a, 9, 1).unwrap().bundle;
        assert_eq!(b.encrypted_transfer_amount.to_bytes().len(), 64);
        assert_eq!(b.equality_proof.as_bytes().len(), 192);
        assert_eq!(b.validity_proof.as_bytes().len(), 96);
        assert_eq!(b.range_proof.as_bytes().len(), 674);
        assert_eq!(b.amount_range_proof.as_bytes().len(), 674);
    }

    #[test]
    fn substituted_balance_rejected() {
        let a = accounts(100);
        let out = transfer(&a, 100, 30).unwrap();
        let (other_balance, _) = a.source.pubkey().encrypt(100);
        let result = verify_transfer_local(&out.bundle, &other_balance, a.source.pubkey(), a.dest.pubkey());
        assert!(!result.valid);
    }

    #[test]
    fn wrong_recipient_rejected() {
        let a = accounts(100);
        let out = transfer(&a, 100, 30).unwrap();
        let mallory = ElGamalKeypair::generate();
        let result = verify_transfer_local(&out.bundle, &a.balance, a.source.pubkey(), mallory.pubkey());
        assert!(!result.valid);
    }

    #[test]
    fn negative_transfer_amount_rejected() {
        // A well-formed encryption of -5: the sender gains 5, the recipient
        // loses 5, and every proof except the amount's range proof holds.
        let a = accounts(100);
        let honest = transfer(&a, 100, 5).unwrap().bundle;

        let r = random_scalar();
        let minus_five = -Scalar::from(5u64);
        let commitment = minus_five * generator_g() + r * generator_h();
        let encrypted_transfer_amount = Ciphertext {
            commitment,
            handle: a.source.pubkey().decrypt_handle(&r),
        };
        let dest_ciphertext = Ciphertext {
            commitment,
            handle: a.dest.pubkey().decrypt_handle(&r),
        };
        let new_source_balance = &a.balance - &encrypted_transfer_amount;
        assert!(a.source.secret().decrypts_to(&new_source_balance, 105));

        let opening = random_scalar();
        let new_balance_commitment = commit_unchecked(105, &opening);
        let forged = TransferProofBundle {
            encrypted_transfer_amount,
            equality_proof: prove_equality(
                &a.source,
                &new_source_balance,
                &new_balance_commitment,
                105,
                &opening,
            )
            .unwrap(),
            validity_proof: validity_sigma(&dest_ciphertext, a.dest.pubkey(), &minus_five, &r),
            range_proof: prove_range(105, &opening, &new_balance_commitment).unwrap(),
            amount_range_proof: honest.amount_range_proof,
            new_source_balance,
            dest_ciphertext,
            new_balance_commitment,
        };
        assert!(verify_validity(&forged.validity_proof, a.dest.pubkey(), &forged.dest_ciphertext).is_ok());
        assert!(verify_range(&forged.range_proof, &forged.new_balance_commitment).is_ok());

        let result = verify_transfer_local(&forged, &a.balance, a.source.pubkey(), a.dest.pubkey());
        assert!(!result.valid);
        assert!(matches!(result.error, Some(VerifyError::Failed(_))));
    }

    #[test]
    fn amount_range_proof_covers_shared_commitment() {
        let a = accounts(100);
        let b = transfer(&a, 100, 60).unwrap().bundle;
        assert!(verify_range(&b.amount_range_proof, &b.dest_ciphertext.pedersen_commitment()).is_ok());
        assert!(verify_range(&b.amount_range_proof, &b.new_balance_commitment).is_err());
    }

    #[test]
    fn zk_mode_emits_four_verifier_instructions() {
        let a = accounts(100);
        let out = build_transfer_proof(
            TransferProofInput {
                source_balance: &a.balance,
                source_available: 100,
                transfer_amount: 1,
                source_keypair: &a.source,
                dest_pubkey: a.dest.pubkey(),
                source_randomness: &random_scalar(),
            },
            &ProofMode::zk_program(),
        )
        .unwrap();
        assert!(out.requires_external_verifier);
        let tags: Vec<_> = out.verifier_instructions.iter().filter_map(|ix| ix.tag()).collect();
        assert_eq!(tags, vec![3, 9, 6, 6]);
    }
}
