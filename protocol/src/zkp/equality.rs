//! # Ciphertext-Commitment Equality Proofs
//!
//! Proves that an ElGamal ciphertext decryptable under keypair `(s, P)` and a
//! Pedersen commitment `C_pc = x*G + r*H` hold the same value `x`. This is
//! how a range proof, which speaks about a fresh commitment, gets tied to a
//! homomorphically computed balance whose own opening nobody knows.
//!
//! ```text
//! prover     y_s, y_x, y_r random
//!            Y0 = y_s*P
//!            Y1 = y_x*G + y_s*D
//!            Y2 = y_x*G + y_r*H
//!            c  = H(P, C, D, C_pc, Y0, Y1, Y2)
//!            z_s = c*s + y_s,  z_x = c*x + y_x,  z_r = c*r + y_r
//!
//! verifier   z_s*P          == c*H    + Y0
//!            z_x*G + z_s*D  == c*C    + Y1
//!            z_x*G + z_r*H  == c*C_pc + Y2
//! ```
//!
//! 192 bytes: `Y0 || Y1 || Y2 || z_s || z_x || z_r`.

use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use super::{proof_bytes, LocalVerification, ProofError, ProofMode, VerifyError};
use crate::config::EQUALITY_PROOF_LENGTH;
use crate::crypto::pedersen::{
    ensure_nonzero, generator_g, generator_h, random_scalar, verify_opening,
};
use crate::crypto::transcript::{new_transcript, TranscriptProtocol};
use crate::crypto::{
    decode_point, decode_scalar, Ciphertext, ElGamalKeypair, ElGamalPubkey, InputError,
    PedersenCommitment,
};
use crate::instruction::{proof as proof_ix, Instruction};

const DOMAIN: &[u8] = b"ciphertext-commitment-equality-proof";

proof_bytes!(
    /// A 192-byte ciphertext-commitment equality proof.
    EqualityProof,
    EQUALITY_PROOF_LENGTH
);

fn statement_transcript(
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
) -> Transcript {
    let mut t = new_transcript(DOMAIN);
    t.append_pubkey(b"pubkey", pubkey);
    t.append_ciphertext(b"ciphertext", ciphertext);
    t.append_commitment(b"commitment", commitment);
    t
}

/// Prove `ciphertext` (under `keypair`) and `commitment` both hold `amount`.
///
/// `opening` is the commitment's blinding factor. Returns the proof and, in
/// ZK modes, the matching verifier instruction.
pub fn build_equality_proof(
    keypair: &ElGamalKeypair,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
    amount: u64,
    opening: &Scalar,
    mode: &ProofMode,
) -> Result<(EqualityProof, Option<Instruction>), ProofError> {
    let proof = prove_equality(keypair, ciphertext, commitment, amount, opening)?;
    let instruction = mode.verifier().map(|v| {
        proof_ix::verify_ciphertext_commitment_equality(
            v.program_id,
            keypair.pubkey(),
            ciphertext,
            commitment,
            &proof,
            None,
        )
    });
    Ok((proof, instruction))
}

pub(crate) fn prove_equality(
    keypair: &ElGamalKeypair,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
    amount: u64,
    opening: &Scalar,
) -> Result<EqualityProof, ProofError> {
    ensure_nonzero(opening)?;
    if !keypair.secret().decrypts_to(ciphertext, amount) {
        return Err(InputError::BalanceMismatch("ciphertext does not decrypt to the stated amount").into());
    }
    if !verify_opening(commitment, amount, opening) {
        return Err(InputError::BalanceMismatch("commitment does not open to the stated amount").into());
    }

    let pubkey = keypair.pubkey();
    let s = keypair.secret().scalar();
    let x = Scalar::from(amount);

    let y_s = random_scalar();
    let y_x = random_scalar();
    let y_r = random_scalar();

    let y0 = y_s * pubkey.point();
    let y1 = y_x * generator_g() + y_s * ciphertext.handle;
    let y2 = y_x * generator_g() + y_r * generator_h();

    let mut t = statement_transcript(pubkey, ciphertext, commitment);
    t.append_point(b"Y0", &y0);
    t.append_point(b"Y1", &y1);
    t.append_point(b"Y2", &y2);
    let c = t.challenge_scalar(b"c");

    let z_s = c * s + y_s;
    let z_x = c * x + y_x;
    let z_r = c * opening + y_r;

    let mut out = [0u8; EQUALITY_PROOF_LENGTH];
    out[..32].copy_from_slice(y0.compress().as_bytes());
    out[32..64].copy_from_slice(y1.compress().as_bytes());
    out[64..96].copy_from_slice(y2.compress().as_bytes());
    out[96..128].copy_from_slice(z_s.as_bytes());
    out[128..160].copy_from_slice(z_x.as_bytes());
    out[160..].copy_from_slice(z_r.as_bytes());
    Ok(EqualityProof(out))
}

/// Verify a serialized equality proof.
pub fn verify_equality_proof_local(
    proof: &[u8],
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
) -> LocalVerification {
    EqualityProof::from_bytes(proof)
        .and_then(|p| verify_equality(&p, pubkey, ciphertext, commitment))
        .into()
}

pub(crate) fn verify_equality(
    proof: &EqualityProof,
    pubkey: &ElGamalPubkey,
    ciphertext: &Ciphertext,
    commitment: &PedersenCommitment,
) -> Result<(), VerifyError> {
    let bytes = proof.as_bytes();
    let point = |at: usize| {
        decode_point(&bytes[at..at + 32]).map_err(|_| VerifyError::Malformed("invalid point"))
    };
    let scalar = |at: usize| {
        decode_scalar(&bytes[at..at + 32]).map_err(|_| VerifyError::Malformed("non-canonical scalar"))
    };
    let (y0, y1, y2) = (point(0)?, point(32)?, point(64)?);
    let (z_s, z_x, z_r) = (scalar(96)?, scalar(128)?, scalar(160)?);

    let mut t = statement_transcript(pubkey, ciphertext, commitment);
    t.append_point(b"Y0", &y0);
    t.append_point(b"Y1", &y1);
    t.append_point(b"Y2", &y2);
    let c = t.challenge_scalar(b"c");

    let g = generator_g();
    let h = generator_h();

    if z_s * pubkey.point() != c * h + y0 {
        return Err(VerifyError::Failed("equality proof: key check".into()));
    }
    if z_x * g + z_s * ciphertext.handle != c * ciphertext.commitment + y1 {
        return Err(VerifyError::Failed("equality proof: ciphertext check".into()));
    }
    if z_x * g + z_r * h != c * commitment.point() + y2 {
        return Err(VerifyError::Failed("equality proof: commitment check".into()));
    }
    Ok(())
}
