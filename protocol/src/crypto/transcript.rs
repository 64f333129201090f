//! Fiat-Shamir transcripts.
//!
//! Every proof in the crate derives its challenges from a Merlin transcript
//! that starts with a per-proof domain separator and absorbs the full public
//! statement before any prover message. Prover and verifier must append the
//! same labels in the same order; the helpers here keep that in one place.

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use merlin::Transcript;

use super::elgamal::{Ciphertext, ElGamalPubkey};
use super::pedersen::PedersenCommitment;

pub(crate) const PROTOCOL_LABEL: &[u8] = b"cloak-protocol v1";

pub(crate) trait TranscriptProtocol {
    fn domain_separator(&mut self, proof: &'static [u8]);
    fn append_point(&mut self, label: &'static [u8], point: &RistrettoPoint);
    fn append_pubkey(&mut self, label: &'static [u8], pubkey: &ElGamalPubkey);
    fn append_ciphertext(&mut self, label: &'static [u8], ciphertext: &Ciphertext);
    fn append_commitment(&mut self, label: &'static [u8], commitment: &PedersenCommitment);
    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar);
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn domain_separator(&mut self, proof: &'static [u8]) {
        self.append_message(b"dom-sep", proof);
    }

    fn append_point(&mut self, label: &'static [u8], point: &RistrettoPoint) {
        self.append_message(label, point.compress().as_bytes());
    }

    fn append_pubkey(&mut self, label: &'static [u8], pubkey: &ElGamalPubkey) {
        self.append_message(label, &pubkey.to_bytes());
    }

    fn append_ciphertext(&mut self, label: &'static [u8], ciphertext: &Ciphertext) {
        self.append_message(label, &ciphertext.to_bytes());
    }

    fn append_commitment(&mut self, label: &'static [u8], commitment: &PedersenCommitment) {
        self.append_message(label, &commitment.to_bytes());
    }

    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar) {
        self.append_message(label, scalar.as_bytes());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut wide = [0u8; 64];
        self.challenge_bytes(label, &mut wide);
        Scalar::from_bytes_mod_order_wide(&wide)
    }
}

/// Fresh transcript for one proof type.
pub(crate) fn new_transcript(proof: &'static [u8]) -> Transcript {
    let mut t = Transcript::new(PROTOCOL_LABEL);
    t.domain_separator(proof);
    t
}
