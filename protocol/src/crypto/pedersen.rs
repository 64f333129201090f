//! # Pedersen Commitments over Ristretto
//!
//! A commitment to value `v` with blinding factor `r` is
//!
//! ```text
//! C = v * G + r * H
//! ```
//!
//! `G` is the Ristretto basepoint. `H` is derived by hashing a fixed label to
//! the group, so nobody knows `log_G(H)`; that is what makes the commitment
//! binding. Hiding comes from `r`, which is why a zero blinding factor is
//! rejected: `v * G` alone is a public, brute-forceable value.
//!
//! The same `(G, H)` pair is used by the ElGamal ciphertexts and handed to
//! the Bulletproofs prover, so a ciphertext's commitment half is directly a
//! Pedersen commitment a range proof can speak about.

use std::sync::OnceLock;

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::Sha512;

use super::{decode_point, InputError};

const PEDERSEN_H_LABEL: &[u8] = b"cloak-protocol/pedersen/H";

/// Value generator.
pub fn generator_g() -> RistrettoPoint {
    RISTRETTO_BASEPOINT_POINT
}

/// Blinding generator, hashed to the group once per process.
pub fn generator_h() -> RistrettoPoint {
    static H: OnceLock<RistrettoPoint> = OnceLock::new();
    *H.get_or_init(|| RistrettoPoint::hash_from_bytes::<Sha512>(PEDERSEN_H_LABEL))
}

/// Clamp 32 random bytes the way Edwards-form secret scalars are clamped:
/// clear the low 3 bits, clear bit 255, set bit 254.
pub(crate) fn clamp(mut bytes: [u8; 32]) -> [u8; 32] {
    bytes[0] &= 0b1111_1000;
    bytes[31] &= 0b0111_1111;
    bytes[31] |= 0b0100_0000;
    bytes
}

/// Draw a non-zero blinding scalar from `rng`.
pub fn random_scalar_from<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    loop {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let scalar = Scalar::from_bytes_mod_order(clamp(bytes));
        if scalar != Scalar::ZERO {
            return scalar;
        }
    }
}

/// Draw a non-zero blinding scalar from the OS RNG.
pub fn random_scalar() -> Scalar {
    random_scalar_from(&mut OsRng)
}

pub(crate) fn ensure_nonzero(scalar: &Scalar) -> Result<(), InputError> {
    if *scalar == Scalar::ZERO {
        return Err(InputError::InvalidRandomness);
    }
    Ok(())
}

/// A Pedersen commitment point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedersenCommitment(pub(crate) RistrettoPoint);

impl PedersenCommitment {
    pub fn from_point(point: RistrettoPoint) -> Self {
        Self(point)
    }

    pub fn point(&self) -> &RistrettoPoint {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
        decode_point(bytes).map(Self)
    }
}

/// Commit to `amount` under `blinding`.
///
/// Deterministic: the same pair always yields the same point.
pub fn commit(amount: u64, blinding: &Scalar) -> Result<PedersenCommitment, InputError> {
    ensure_nonzero(blinding)?;
    Ok(commit_unchecked(amount, blinding))
}

pub(crate) fn commit_unchecked(amount: u64, blinding: &Scalar) -> PedersenCommitment {
    PedersenCommitment(Scalar::from(amount) * generator_g() + blinding * generator_h())
}

/// Open a commitment. Reveals the witness, so only for audits and tests.
pub fn verify_opening(commitment: &PedersenCommitment, amount: u64, blinding: &Scalar) -> bool {
    commit_unchecked(amount, blinding) == *commitment
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn commitment_deterministic() {
        let r = random_scalar();
        let c1 = commit(100, &r).unwrap();
        let c2 = commit(100, &r).unwrap();
        assert_eq!(c1.to_bytes(), c2.to_bytes());
    }

    #[test]
    fn different_values_different_commitments() {
        let r = random_scalar();
        assert_ne!(commit(100, &r).unwrap(), commit(101, &r).unwrap());
    }

    #[test]
    fn different_blindings_different_commitments() {
        let c1 = commit(100, &random_scalar()).unwrap();
        let c2 = commit(100, &random_scalar()).unwrap();
        assert_ne!(c1, c2, "hiding: fresh blindings must differ");
    }

    #[test]
    fn zero_blinding_rejected() {
        assert_eq!(commit(5, &Scalar::ZERO), Err(InputError::InvalidRandomness));
    }

    #[test]
    fn opening_checks_both_witnesses() {
        let r = random_scalar();
        let c = commit(42, &r).unwrap();
        assert!(verify_opening(&c, 42, &r));
        assert!(!verify_opening(&c, 43, &r));
        assert!(!verify_opening(&c, 42, &random_scalar()));
    }

    #[test]
    fn clamping_sets_expected_bits() {
        let clamped = clamp([0xff; 32]);
        assert_eq!(clamped[0] & 0b111, 0);
        assert_eq!(clamped[31] & 0x80, 0);
        assert_eq!(clamped[31] & 0x40, 0x40);

        let clamped = clamp([0u8; 32]);
        assert_eq!(clamped[31], 0x40);
    }

    #[test]
    fn seeded_scalars_are_reproducible_and_nonzero() {
        let a = random_scalar_from(&mut StdRng::seed_from_u64(7));
        let b = random_scalar_from(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_ne!(a, Scalar::ZERO);
    }

    #[test]
    fn generators_are_independent() {
        assert_ne!(generator_g(), generator_h());
        assert_eq!(generator_h(), generator_h());
    }

    #[test]
    fn commitment_bytes_round_trip() {
        let c = commit(9, &random_scalar()).unwrap();
        assert_eq!(PedersenCommitment::from_bytes(&c.to_bytes()).unwrap(), c);
    }
}
