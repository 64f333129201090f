//! # Range Proofs
//!
//! Proves that a Pedersen commitment opens to a value in `[0, 2^64)` without
//! revealing it. Uses single-value 64-bit Bulletproofs: logarithmic size,
//! no trusted setup.
//!
//! The `bulletproofs` crate is built on the `curve25519-dalek-ng` fork, so
//! the crate's generators are carried across by their compressed encoding.
//! Both forks agree on the Ristretto basepoint; `H` is the same hash-derived
//! point the ElGamal ciphertexts use, so a ciphertext's commitment half can
//! be range-proven directly.
//!
//! ## Wire format
//!
//! ```text
//! u16 LE length (= 672) || Bulletproof (672 bytes)   = 674 bytes
//! ```
//!
//! The Bulletproof itself is `A, S, T1, T2` (4 points), `t_x, t_x_blinding,
//! e_blinding` (3 scalars) and the inner-product argument (6 rounds of
//! `L, R` plus `a, b`).

use std::sync::OnceLock;

use bulletproofs::{BulletproofGens, PedersenGens, RangeProof as Bulletproof};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek_ng::constants::RISTRETTO_BASEPOINT_POINT as G_NG;
use curve25519_dalek_ng::ristretto::CompressedRistretto as CompressedRistrettoNg;
use curve25519_dalek_ng::scalar::Scalar as ScalarNg;
use merlin::Transcript;
use tracing::debug;

use super::{proof_bytes, LocalVerification, ProofError, ProofMode, VerifyError};
use crate::config::{BULLETPROOF_U64_LENGTH, RANGE_PROOF_BITS, RANGE_PROOF_LENGTH};
use crate::crypto::pedersen::{commit_unchecked, ensure_nonzero, generator_h};
use crate::crypto::transcript::{new_transcript, TranscriptProtocol};
use crate::crypto::PedersenCommitment;
use crate::instruction::{proof as proof_ix, Instruction};

const DOMAIN: &[u8] = b"range-proof-u64";

proof_bytes!(
    /// A 674-byte range proof for one 64-bit committed value.
    RangeProof,
    RANGE_PROOF_LENGTH
);

/// Result of [`build_range_proof`].
#[derive(Debug, Clone)]
pub struct RangeProofOutput {
    pub proof: RangeProof,
    pub commitment: PedersenCommitment,
    pub requires_external_verifier: bool,
    pub verifier_instruction: Option<Instruction>,
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn bulletproof_gens() -> &'static BulletproofGens {
    static GENS: OnceLock<BulletproofGens> = OnceLock::new();
    GENS.get_or_init(|| BulletproofGens::new(RANGE_PROOF_BITS, 1))
}

fn pedersen_gens() -> Option<PedersenGens> {
    let h = CompressedRistrettoNg(generator_h().compress().to_bytes()).decompress()?;
    Some(PedersenGens {
        B: G_NG,
        B_blinding: h,
    })
}

fn transcript_for(commitment: &PedersenCommitment) -> Transcript {
    let mut t = new_transcript(DOMAIN);
    t.append_commitment(b"commitment", commitment);
    t
}

// ---------------------------------------------------------------------------
// Prover
// ---------------------------------------------------------------------------

/// Build a range proof for `amount` under `blinding`.
///
/// The commitment is deterministic in `(amount, blinding)`; the proof is not.
/// In either ZK-program mode the output also carries the instruction asking
/// the on-chain verifier to check the proof.
pub fn build_range_proof(
    amount: u64,
    blinding: &Scalar,
    mode: &ProofMode,
) -> Result<RangeProofOutput, ProofError> {
    ensure_nonzero(blinding)?;
    let commitment = commit_unchecked(amount, blinding);
    let proof = prove_range(amount, blinding, &commitment)?;

    let verifier_instruction = mode
        .verifier()
        .map(|v| proof_ix::verify_range_proof(v.program_id, &commitment, &proof, None));

    Ok(RangeProofOutput {
        proof,
        commitment,
        requires_external_verifier: mode.requires_external_verifier(),
        verifier_instruction,
    })
}

/// Prove `commitment` opens to `amount` in range. Callers have already
/// checked that `commitment == commit(amount, blinding)`.
pub(crate) fn prove_range(
    amount: u64,
    blinding: &Scalar,
    commitment: &PedersenCommitment,
) -> Result<RangeProof, ProofError> {
    let pc_gens = pedersen_gens()
        .ok_or_else(|| ProofError::Generation("blinding generator has no dalek-ng image".into()))?;
    let blinding_ng = ScalarNg::from_bytes_mod_order(blinding.to_bytes());

    let mut transcript = transcript_for(commitment);
    let (bulletproof, committed) = Bulletproof::prove_single(
        bulletproof_gens(),
        &pc_gens,
        &mut transcript,
        amount,
        &blinding_ng,
        RANGE_PROOF_BITS,
    )
    .map_err(|e| ProofError::Generation(format!("bulletproof: {e:?}")))?;

    if committed.to_bytes() != commitment.to_bytes() {
        return Err(ProofError::Generation(
            "bulletproof commitment does not match the Pedersen commitment".into(),
        ));
    }

    let raw = bulletproof.to_bytes();
    if raw.len() != BULLETPROOF_U64_LENGTH {
        return Err(ProofError::Generation(format!(
            "unexpected bulletproof length {}",
            raw.len()
        )));
    }

    let mut out = [0u8; RANGE_PROOF_LENGTH];
    out[..2].copy_from_slice(&(BULLETPROOF_U64_LENGTH as u16).to_le_bytes());
    out[2..].copy_from_slice(&raw);
    debug!(bytes = RANGE_PROOF_LENGTH, "range proof built");
    Ok(RangeProof(out))
}

// ---------------------------------------------------------------------------
// Verifier
// ---------------------------------------------------------------------------

/// Verify a serialized range proof against `commitment` in this process.
///
/// Never panics and never returns `Err`: malformed input is reported as
/// `valid == false` with the reason in `error`.
pub fn verify_range_proof_local(proof: &[u8], commitment: &PedersenCommitment) -> LocalVerification {
    let result = RangeProof::from_bytes(proof).and_then(|p| verify_range(&p, commitment));
    if let Err(e) = &result {
        debug!(error = %e, "range proof rejected");
    }
    result.into()
}

pub(crate) fn verify_range(proof: &RangeProof, commitment: &PedersenCommitment) -> Result<(), VerifyError> {
    let bytes = proof.as_bytes();
    let declared = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
    if declared != BULLETPROOF_U64_LENGTH {
        return Err(VerifyError::Malformed("range proof length prefix"));
    }

    let bulletproof = Bulletproof::from_bytes(&bytes[2..])
        .map_err(|_| VerifyError::Malformed("bulletproof encoding"))?;
    let pc_gens = pedersen_gens().ok_or(VerifyError::Malformed("blinding generator"))?;

    let mut transcript = transcript_for(commitment);
    bulletproof
        .verify_single(
            bulletproof_gens(),
            &pc_gens,
            &mut transcript,
            &CompressedRistrettoNg(commitment.to_bytes()),
            RANGE_PROOF_BITS,
        )
        .map_err(|e| VerifyError::Failed(format!("range proof: {e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pedersen::{commit, random_scalar};

    #[test]
    fn proof_is_674_bytes_with_prefix() {
        let out = build_range_proof(42, &random_scalar(), &ProofMode::LocalOnly).unwrap();
        let bytes = out.proof.to_bytes();
        assert_eq!(bytes.len(), 674);
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 672);
    }

    #[test]
    fn proofs_verify_across_the_range() {
        for amount in [0u64, 1, 1_000_000, u64::MAX] {
            let out = build_range_proof(amount, &random_scalar(), &ProofMode::LocalOnly).unwrap();
            let result = verify_range_proof_local(out.proof.as_bytes(), &out.commitment);
            assert!(result.valid, "amount {amount}: {:?}", result.error);
            assert!(result.used_fallback);
        }
    }

    #[test]
    fn commitment_matches_pedersen_commit() {
        let r = random_scalar();
        let out = build_range_proof(500, &r, &ProofMode::LocalOnly).unwrap();
        assert_eq!(out.commitment, commit(500, &r).unwrap());
    }

    #[test]
    fn wrong_commitment_rejected() {
        let out = build_range_proof(7, &random_scalar(), &ProofMode::LocalOnly).unwrap();
        let other = commit(7, &random_scalar()).unwrap();
        let result = verify_range_proof_local(out.proof.as_bytes(), &other);
        assert!(!result.valid);
        assert!(matches!(result.error, Some(VerifyError::Failed(_))));
    }

    #[test]
    fn short_buffer_reports_size() {
        let c = commit(1, &random_scalar()).unwrap();
        let result = verify_range_proof_local(&[0u8; 100], &c);
        assert!(!result.valid);
        let msg = result.error.unwrap().to_string();
        assert_eq!(msg, "Invalid proof size: expected 674 bytes, got 100");
    }

    #[test]
    fn garbage_of_right_size_does_not_panic() {
        let c = commit(1, &random_scalar()).unwrap();
        let mut junk = [0xabu8; RANGE_PROOF_LENGTH];
        assert!(!verify_range_proof_local(&junk, &c).valid);

        junk[..2].copy_from_slice(&672u16.to_le_bytes());
        assert!(!verify_range_proof_local(&junk, &c).valid);
    }

    #[test]
    fn tampered_proof_rejected() {
        let out = build_range_proof(99, &random_scalar(), &ProofMode::LocalOnly).unwrap();
        let mut bytes = out.proof.to_bytes();
        bytes[300] ^= 0x01;
        assert!(!verify_range_proof_local(&bytes, &out.commitment).valid);
    }

    #[test]
    fn zero_blinding_rejected() {
        assert!(matches!(
            build_range_proof(1, &Scalar::ZERO, &ProofMode::LocalOnly),
            Err(ProofError::Input(_))
        ));
    }

    #[test]
    fn zk_mode_emits_verifier_instruction() {
        let out = build_range_proof(3, &random_scalar(), &ProofMode::zk_program()).unwrap();
        assert!(out.requires_external_verifier);
        let ix = out.verifier_instruction.unwrap();
        assert_eq!(ix.program_id, crate::config::ZK_PROOF_PROGRAM_ID);
        assert_eq!(ix.tag(), Some(proof_ix::ProofInstruction::VerifyRangeProofU64 as u8));

        let local = build_range_proof(3, &random_scalar(), &ProofMode::LocalOnly).unwrap();
        assert!(!local.requires_external_verifier);
        assert!(local.verifier_instruction.is_none());
    }
}
