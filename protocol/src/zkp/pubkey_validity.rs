//! Public key validity proof: knowledge of `s` with `s*P = H`.
//!
//! Attached when an account registers its ElGamal key, so nobody can
//! register a key they cannot decrypt with. 64 bytes: `Y || z`.
//!
//! ```text
//! prover     y random, Y = y*P, c = H(P, Y), z = c*s + y
//! verifier   z*P == c*H + Y
//! ```

use super::{proof_bytes, LocalVerification, ProofError, VerifyError};
use crate::config::PUBKEY_VALIDITY_PROOF_LENGTH;
use crate::crypto::pedersen::{generator_h, random_scalar};
use crate::crypto::transcript::{new_transcript, TranscriptProtocol};
use crate::crypto::{decode_point, decode_scalar, ElGamalKeypair, ElGamalPubkey};

const DOMAIN: &[u8] = b"pubkey-validity-proof";

proof_bytes!(
    /// A 64-byte proof of knowledge of an ElGamal secret key.
    PubkeyValidityProof,
    PUBKEY_VALIDITY_PROOF_LENGTH
);

pub fn build_pubkey_validity_proof(keypair: &ElGamalKeypair) -> Result<PubkeyValidityProof, ProofError> {
    let pubkey = keypair.pubkey();
    let y = random_scalar();
    let big_y = y * pubkey.point();

    let mut t = new_transcript(DOMAIN);
    t.append_pubkey(b"pubkey", pubkey);
    t.append_point(b"Y", &big_y);
    let c = t.challenge_scalar(b"c");

    let z = c * keypair.secret().scalar() + y;

    let mut out = [0u8; PUBKEY_VALIDITY_PROOF_LENGTH];
    out[..32].copy_from_slice(big_y.compress().as_bytes());
    out[32..].copy_from_slice(z.as_bytes());
    Ok(PubkeyValidityProof(out))
}

pub fn verify_pubkey_validity_proof_local(proof: &[u8], pubkey: &ElGamalPubkey) -> LocalVerification {
    PubkeyValidityProof::from_bytes(proof)
        .and_then(|p| verify_pubkey_validity(&p, pubkey))
        .into()
}

pub(crate) fn verify_pubkey_validity(
    proof: &PubkeyValidityProof,
    pubkey: &ElGamalPubkey,
) -> Result<(), VerifyError> {
    let bytes = proof.as_bytes();
    let big_y = decode_point(&bytes[..32]).map_err(|_| VerifyError::Malformed("invalid point"))?;
    let z = decode_scalar(&bytes[32..]).map_err(|_| VerifyError::Malformed("non-canonical scalar"))?;

    let mut t = new_transcript(DOMAIN);
    t.append_pubkey(b"pubkey", pubkey);
    t.append_point(b"Y", &big_y);
    let c = t.challenge_scalar(b"c");

    if z * pubkey.point() == c * generator_h() + big_y {
        Ok(())
    } else {
        Err(VerifyError::Failed("pubkey validity proof".into()))
    }
}
