//! # Ciphertext Validity Proofs
//!
//! Shows that a ciphertext `(C, D)` is well formed under public key `P`:
//! the prover knows `x, r` with `C = x*G + r*H` and `D = r*P`. Without it a
//! sender could hand the recipient a handle that does not match the
//! commitment, leaving a balance nobody can decrypt.
//!
//! Sigma protocol in challenge form (96 bytes: `c || z_x || z_r`):
//!
//! ```text
//! prover     y_x, y_r random
//!            Y0 = y_x*G + y_r*H,  Y1 = y_r*P
//!            c  = H(P, C, D, Y0, Y1)
//!            z_x = y_x + c*x,     z_r = y_r + c*r
//!
//! verifier   Y0' = z_x*G + z_r*H - c*C
//!            Y1' = z_r*P - c*D
//!            accept iff H(P, C, D, Y0', Y1') == c
//! ```

use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use super::{proof_bytes, LocalVerification, ProofError, ProofMode, VerifyError};
use crate::config::VALIDITY_PROOF_LENGTH;
use crate::crypto::pedersen::{ensure_nonzero, generator_g, generator_h, random_scalar};
use crate::crypto::transcript::{new_transcript, TranscriptProtocol};
use crate::crypto::{decode_scalar, Ciphertext, ElGamalPubkey, InputError};
use crate::instruction::{proof as proof_ix, Instruction};

const DOMAIN: &[u8] = b"ciphertext-validity-proof";

proof_bytes!(
    /// A 96-byte ciphertext validity proof.
    ValidityProof,
    VALIDITY_PROOF_LENGTH
);

/// Result of [`build_validity_proof`].
#[derive(Debug, Clone)]
pub struct ValidityProofOutput {
    pub proof: ValidityProof,
    pub requires_external_verifier: bool,
    pub verifier_instruction: Option<Instruction>,
}

fn statement_transcript(pubkey: &ElGamalPubkey, ciphertext: &Ciphertext) -> Transcript {
    let mut t = new_transcript(DOMAIN);
    t.append_pubkey(b"pubkey", pubkey);
    t.append_ciphertext(b"ciphertext", ciphertext);
    t
}

/// Prove that `ciphertext` encrypts `amount` under `pubkey` with `randomness`.
///
/// Fresh nonces are drawn on every call, so identical inputs give different
/// (equally valid) proofs.
pub fn build_validity_proof(
    ciphertext: &Ciphertext,
    pubkey: &ElGamalPubkey,
    amount: u64,
    randomness: &Scalar,
    mode: &ProofMode,
) -> Result<ValidityProofOutput, ProofError> {
    let proof = prove_validity(ciphertext, pubkey, amount, randomness)?;
    let verifier_instruction = mode
        .verifier()
        .map(|v| proof_ix::verify_ciphertext_validity(v.program_id, pubkey, ciphertext, &proof, None));

    Ok(ValidityProofOutput {
        proof,
        requires_external_verifier: mode.requires_external_verifier(),
        verifier_instruction,
    })
}

pub(crate) fn prove_validity(
    ciphertext: &Ciphertext,
    pubkey: &ElGamalPubkey,
    amount: u64,
    randomness: &Scalar,
) -> Result<ValidityProof, ProofError> {
    ensure_nonzero(randomness)?;
    if pubkey.encrypt_unchecked(amount, randomness) != *ciphertext {
        return Err(InputError::BalanceMismatch(
            "ciphertext does not encrypt the given amount under the given randomness",
        )
        .into());
    }
    Ok(validity_sigma(ciphertext, pubkey, &Scalar::from(amount), randomness))
}

/// The Sigma protocol itself, for any scalar `x`. Callers establish that
/// `x` is the ciphertext's amount.
pub(super) fn validity_sigma(
    ciphertext: &Ciphertext,
    pubkey: &ElGamalPubkey,
    x: &Scalar,
    randomness: &Scalar,
) -> ValidityProof {
    let y_x = random_scalar();
    let y_r = random_scalar();

    let y0 = y_x * generator_g() + y_r * generator_h();
    let y1 = y_r * pubkey.point();

    let mut t = statement_transcript(pubkey, ciphertext);
    t.append_point(b"Y0", &y0);
    t.append_point(b"Y1", &y1);
    let c = t.challenge_scalar(b"c");

    let z_x = y_x + c * x;
    let z_r = y_r + c * randomness;

    let mut out = [0u8; VALIDITY_PROOF_LENGTH];
    out[..32].copy_from_slice(c.as_bytes());
    out[32..64].copy_from_slice(z_x.as_bytes());
    out[64..].copy_from_slice(z_r.as_bytes());
    ValidityProof(out)
}

/// Verify a serialized validity proof for `ciphertext` under `pubkey`.
pub fn verify_validity_proof_local(
    proof: &[u8],
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
) -> LocalVerification {
    ValidityProof::from_bytes(proof)
        .and_then(|p| verify_validity(&p, pubkey, ciphertext))
        .into()
}

pub(crate) fn verify_validity(
    proof: &ValidityProof,
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
) -> Result<(), VerifyError> {
    let bytes = proof.as_bytes();
    let scalar = |range: std::ops::Range<usize>| {
        decode_scalar(&bytes[range]).map_err(|_| VerifyError::Malformed("non-canonical scalar"))
    };
    let c = scalar(0..32)?;
    let z_x = scalar(32..64)?;
    let z_r = scalar(64..96)?;

    let y0 = z_x * generator_g() + z_r * generator_h() - c * ciphertext.commitment;
    let y1 = z_r * pubkey.point() - c * ciphertext.handle;

    let mut t = statement_transcript(pubkey, ciphertext);
    t.append_point(b"Y0", &y0);
    t.append_point(b"Y1", &y1);

    if t.challenge_scalar(b"c") == c {
        Ok(())
    } else {
        Err(VerifyError::Failed("ciphertext validity challenge mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ElGamalKeypair;

    fn fixture(amount: u64) -> (ElGamalKeypair, Ciphertext, Scalar) {
        let kp = ElGamalKeypair::generate();
        let (ct, r) = kp.pubkey().encrypt(amount);
        (kp, ct, r)
    }

    #[test]
    fn valid_proof_verifies() {
        let (kp, ct, r) = fixture(1_000);
        let out = build_validity_proof(&ct, kp.pubkey(), 1_000, &r, &ProofMode::LocalOnly).unwrap();
        assert_eq!(out.proof.as_bytes().len(), 96);
        assert!(verify_validity_proof_local(out.proof.as_bytes(), kp.pubkey(), &ct).valid);
    }

    #[test]
    fn repeated_proofs_differ_and_both_verify() {
        let (kp, ct, r) = fixture(5);
        let a = prove_validity(&ct, kp.pubkey(), 5, &r).unwrap();
        let b = prove_validity(&ct, kp.pubkey(), 5, &r).unwrap();
        assert_ne!(a, b);
        assert!(verify_validity(&a, kp.pubkey(), &ct).is_ok());
        assert!(verify_validity(&b, kp.pubkey(), &ct).is_ok());
    }

    #[test]
    fn wrong_witness_rejected_up_front() {
        let (kp, ct, r) = fixture(10);
        assert!(matches!(
            prove_validity(&ct, kp.pubkey(), 11, &r),
            Err(ProofError::Input(InputError::BalanceMismatch(_)))
        ));
        assert!(matches!(
            prove_validity(&ct, kp.pubkey(), 10, &Scalar::ZERO),
            Err(ProofError::Input(InputError::InvalidRandomness))
        ));
    }

    #[test]
    fn proof_bound_to_statement() {
        let (kp, ct, r) = fixture(10);
        let proof = prove_validity(&ct, kp.pubkey(), 10, &r).unwrap();

        let other = ElGamalKeypair::generate();
        assert!(verify_validity(&proof, other.pubkey(), &ct).is_err());
        assert!(verify_validity(&proof, kp.pubkey(), &ct.add_amount(1)).is_err());
    }

    #[test]
    fn mismatched_handle_rejected() {
        let (kp, ct, r) = fixture(10);
        let proof = prove_validity(&ct, kp.pubkey(), 10, &r).unwrap();
        let forged = Ciphertext {
            commitment: ct.commitment,
            handle: ct.handle + generator_g(),
        };
        assert!(verify_validity(&proof, kp.pubkey(), &forged).is_err());
    }

    #[test]
    fn wrong_size_reported() {
        let (kp, ct, _) = fixture(1);
        let result = verify_validity_proof_local(&[0u8; 95], kp.pubkey(), &ct);
        assert_eq!(
            result.error,
            Some(VerifyError::InvalidProofSize {
                expected: 96,
                actual: 95
            })
        );
    }

    #[test]
    fn non_canonical_scalar_is_malformed() {
        let (kp, ct, _) = fixture(1);
        let result = verify_validity_proof_local(&[0xffu8; 96], kp.pubkey(), &ct);
        assert_eq!(result.error, Some(VerifyError::Malformed("non-canonical scalar")));
    }

    #[test]
    fn fallback_mode_emits_instruction() {
        let (kp, ct, r) = fixture(3);
        let out = build_validity_proof(&ct, kp.pubkey(), 3, &r, &ProofMode::with_fallback()).unwrap();
        assert!(out.requires_external_verifier);
        assert_eq!(
            out.verifier_instruction.unwrap().tag(),
            Some(proof_ix::ProofInstruction::VerifyCiphertextValidity as u8)
        );
    }
}
