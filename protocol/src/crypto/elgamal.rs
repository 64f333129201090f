//! # Twisted ElGamal over Ristretto
//!
//! Amounts are encrypted "in the exponent" so ciphertexts add and subtract
//! homomorphically, which is what lets the ledger update an encrypted
//! balance without ever seeing it.
//!
//! ```text
//! secret     s
//! public     P = s^-1 * H
//! encrypt    C = x * G + r * H      (a Pedersen commitment)
//!            D = r * P              (the decrypt handle)
//! decrypt    C - s * D = x * G
//! ```
//!
//! Recovering `x` from `x * G` is a discrete log. Balances are therefore
//! carried alongside an AES-encrypted copy (see `auth_encryption`); the
//! bounded baby-step giant-step search here covers 32-bit values and
//! [`ElGamalSecretKey::decrypts_to`] checks any u64 exactly.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::OnceLock;

use curve25519_dalek::ristretto::RistrettoPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::pedersen::{
    ensure_nonzero, generator_g, generator_h, random_scalar_from, PedersenCommitment,
};
use super::{decode_point, decode_scalar, InputError};
use crate::config::{CIPHERTEXT_LENGTH, DISCRETE_LOG_BITS};

/// Returned when a ciphertext does not decrypt to a small enough integer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("decrypted value is outside the {0}-bit discrete log search range")]
    OutOfSearchRange(u32),
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// ElGamal secret key. Never leaves the account holder.
///
/// Deliberately not `Serialize`, and `Debug` prints nothing useful.
#[derive(Clone)]
pub struct ElGamalSecretKey(Scalar);

/// ElGamal public key.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElGamalPubkey(RistrettoPoint);

/// An owner's keypair. Created once per account.
#[derive(Clone)]
pub struct ElGamalKeypair {
    secret: ElGamalSecretKey,
    public: ElGamalPubkey,
}

impl ElGamalSecretKey {
    /// Wrap a scalar. Zero is not a usable key.
    pub fn from_scalar(scalar: Scalar) -> Result<Self, InputError> {
        ensure_nonzero(&scalar)?;
        Ok(Self(scalar))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
        Self::from_scalar(decode_scalar(bytes)?)
    }

    /// Raw scalar bytes. Serializing a secret is an explicit act.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub(crate) fn scalar(&self) -> &Scalar {
        &self.0
    }

    /// The public key is a pure function of the secret.
    pub fn pubkey(&self) -> ElGamalPubkey {
        ElGamalPubkey(self.0.invert() * generator_h())
    }

    /// `x * G` for the encrypted amount `x`. Exact for every u64.
    pub fn decrypt_to_point(&self, ciphertext: &Ciphertext) -> RistrettoPoint {
        ciphertext.commitment - self.0 * ciphertext.handle
    }

    /// Whether `ciphertext` encrypts exactly `amount`.
    pub fn decrypts_to(&self, ciphertext: &Ciphertext, amount: u64) -> bool {
        self.decrypt_to_point(ciphertext) == Scalar::from(amount) * generator_g()
    }

    /// Recover the encrypted amount when it is below `2^DISCRETE_LOG_BITS`
    /// (2^32).
    ///
    /// This is a baby-step giant-step search, not a full inverse of
    /// [`ElGamalPubkey::encrypt`]: any amount of 2^32 or more comes back as
    /// [`DecryptError::OutOfSearchRange`] even though it was encrypted
    /// correctly. Wallets holding larger balances track the plaintext through
    /// the AES decryptable balance and confirm it with
    /// [`decrypts_to`](Self::decrypts_to), which is exact for every u64.
    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Result<u64, DecryptError> {
        discrete_log(&self.decrypt_to_point(ciphertext))
            .ok_or(DecryptError::OutOfSearchRange(DISCRETE_LOG_BITS))
    }
}

impl fmt::Debug for ElGamalSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ElGamalSecretKey(..)")
    }
}

impl ElGamalPubkey {
    pub fn point(&self) -> &RistrettoPoint {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.compress().to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
        let point = decode_point(bytes)?;
        if point == RistrettoPoint::identity() {
            return Err(InputError::InvalidPoint("public key is the identity"));
        }
        Ok(Self(point))
    }

    /// Encrypt with caller-supplied randomness.
    pub fn encrypt_with(&self, amount: u64, randomness: &Scalar) -> Result<Ciphertext, InputError> {
        ensure_nonzero(randomness)?;
        Ok(self.encrypt_unchecked(amount, randomness))
    }

    /// Encrypt with fresh randomness, returned so proofs can use it.
    pub fn encrypt(&self, amount: u64) -> (Ciphertext, Scalar) {
        let randomness = random_scalar_from(&mut OsRng);
        (self.encrypt_unchecked(amount, &randomness), randomness)
    }

    /// Decrypt handle for an opening shared with another ciphertext.
    pub fn decrypt_handle(&self, randomness: &Scalar) -> RistrettoPoint {
        randomness * self.0
    }

    pub(crate) fn encrypt_unchecked(&self, amount: u64, randomness: &Scalar) -> Ciphertext {
        Ciphertext {
            commitment: Scalar::from(amount) * generator_g() + randomness * generator_h(),
            handle: randomness * self.0,
        }
    }
}

impl fmt::Debug for ElGamalPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElGamalPubkey({})", hex::encode(self.to_bytes()))
    }
}

impl ElGamalKeypair {
    /// Generate a keypair from the OS RNG.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret = ElGamalSecretKey(random_scalar_from(rng));
        Self::from_secret(secret)
    }

    pub fn from_secret(secret: ElGamalSecretKey) -> Self {
        let public = secret.pubkey();
        Self { secret, public }
    }

    pub fn secret(&self) -> &ElGamalSecretKey {
        &self.secret
    }

    pub fn pubkey(&self) -> &ElGamalPubkey {
        &self.public
    }
}

impl fmt::Debug for ElGamalKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElGamalKeypair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Ciphertext
// ---------------------------------------------------------------------------

/// An encrypted 64-bit amount. Serializes as `commitment || handle`.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub commitment: RistrettoPoint,
    pub handle: RistrettoPoint,
}

impl Ciphertext {
    /// Encryption of zero with zero randomness; the additive identity.
    pub fn zero() -> Self {
        Self {
            commitment: RistrettoPoint::identity(),
            handle: RistrettoPoint::identity(),
        }
    }

    pub fn pedersen_commitment(&self) -> PedersenCommitment {
        PedersenCommitment::from_point(self.commitment)
    }

    pub fn to_bytes(&self) -> [u8; CIPHERTEXT_LENGTH] {
        let mut out = [0u8; CIPHERTEXT_LENGTH];
        out[..32].copy_from_slice(self.commitment.compress().as_bytes());
        out[32..].copy_from_slice(self.handle.compress().as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InputError> {
        if bytes.len() != CIPHERTEXT_LENGTH {
            return Err(InputError::InvalidLength {
                what: "ciphertext",
                expected: CIPHERTEXT_LENGTH,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            commitment: decode_point(&bytes[..32])?,
            handle: decode_point(&bytes[32..])?,
        })
    }

    /// Add a public amount: only the commitment moves.
    pub fn add_amount(&self, amount: u64) -> Self {
        Self {
            commitment: self.commitment + Scalar::from(amount) * generator_g(),
            handle: self.handle,
        }
    }

    /// Subtract a public amount: only the commitment moves.
    pub fn subtract_amount(&self, amount: u64) -> Self {
        Self {
            commitment: self.commitment - Scalar::from(amount) * generator_g(),
            handle: self.handle,
        }
    }
}

impl fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ciphertext({})", hex::encode(self.to_bytes()))
    }
}

impl Add for Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: Ciphertext) -> Ciphertext {
        &self + &rhs
    }
}

impl<'a> Add<&'a Ciphertext> for &'a Ciphertext {
    type Output = Ciphertext;

    fn add(self, rhs: &'a Ciphertext) -> Ciphertext {
        Ciphertext {
            commitment: self.commitment + rhs.commitment,
            handle: self.handle + rhs.handle,
        }
    }
}

impl Sub for Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: Ciphertext) -> Ciphertext {
        &self - &rhs
    }
}

impl<'a> Sub<&'a Ciphertext> for &'a Ciphertext {
    type Output = Ciphertext;

    fn sub(self, rhs: &'a Ciphertext) -> Ciphertext {
        Ciphertext {
            commitment: self.commitment - rhs.commitment,
            handle: self.handle - rhs.handle,
        }
    }
}

// ---------------------------------------------------------------------------
// Discrete log
// ---------------------------------------------------------------------------

const BABY_STEPS: u64 = 1 << (DISCRETE_LOG_BITS / 2);

fn baby_step_table() -> &'static HashMap<[u8; 32], u64> {
    static TABLE: OnceLock<HashMap<[u8; 32], u64>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let g = generator_g();
        let mut table = HashMap::with_capacity(BABY_STEPS as usize);
        let mut point = RistrettoPoint::identity();
        for j in 0..BABY_STEPS {
            table.insert(point.compress().to_bytes(), j);
            point += g;
        }
        table
    })
}

/// Baby-step giant-step over `[0, 2^DISCRETE_LOG_BITS)`.
fn discrete_log(target: &RistrettoPoint) -> Option<u64> {
    let table = baby_step_table();
    let giant_step = Scalar::from(BABY_STEPS) * generator_g();
    let mut point = *target;
    for i in 0..BABY_STEPS {
        if let Some(j) = table.get(&point.compress().to_bytes()) {
            return Some(i * BABY_STEPS + j);
        }
        point -= giant_step;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::pedersen::random_scalar;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn pubkey_is_deterministic_in_secret() {
        let kp = ElGamalKeypair::generate();
        let again = ElGamalKeypair::from_secret(kp.secret().clone());
        assert_eq!(kp.pubkey(), again.pubkey());
    }

    #[test]
    fn seeded_keypairs_match() {
        let a = ElGamalKeypair::generate_with(&mut StdRng::seed_from_u64(1));
        let b = ElGamalKeypair::generate_with(&mut StdRng::seed_from_u64(1));
        assert_eq!(a.pubkey(), b.pubkey());
    }

    #[test]
    fn encrypt_decrypt_small_amounts() {
        let kp = ElGamalKeypair::generate();
        for amount in [0u64, 1, 55, 65_535, 65_536, 1_000_000] {
            let (ct, _) = kp.pubkey().encrypt(amount);
            assert_eq!(kp.secret().decrypt(&ct), Ok(amount));
        }
    }

    #[test]
    fn decrypts_to_handles_full_u64_range() {
        let kp = ElGamalKeypair::generate();
        for amount in [u64::MAX, 1u64 << 63, (1u64 << 40) + 17] {
            let ct = kp.pubkey().encrypt_with(amount, &random_scalar()).unwrap();
            assert!(kp.secret().decrypts_to(&ct, amount));
            assert!(!kp.secret().decrypts_to(&ct, amount.wrapping_sub(1)));
        }
    }

    #[test]
    fn large_amount_outside_search_range() {
        let kp = ElGamalKeypair::generate();
        let (ct, _) = kp.pubkey().encrypt(1u64 << 40);
        assert_eq!(
            kp.secret().decrypt(&ct),
            Err(DecryptError::OutOfSearchRange(DISCRETE_LOG_BITS))
        );
    }

    #[test]
    fn search_range_ends_at_two_to_the_32() {
        let kp = ElGamalKeypair::generate();
        let top = (1u64 << DISCRETE_LOG_BITS) - 1;
        let (ct, _) = kp.pubkey().encrypt(top);
        assert_eq!(kp.secret().decrypt(&ct), Ok(top));

        let (ct, _) = kp.pubkey().encrypt(1u64 << DISCRETE_LOG_BITS);
        assert_eq!(kp.secret().decrypt(&ct), Err(DecryptError::OutOfSearchRange(32)));
        assert!(kp.secret().decrypts_to(&ct, 1u64 << DISCRETE_LOG_BITS));
    }

    #[test]
    fn wrong_key_does_not_decrypt() {
        let alice = ElGamalKeypair::generate();
        let bob = ElGamalKeypair::generate();
        let (ct, _) = alice.pubkey().encrypt(500);
        assert!(!bob.secret().decrypts_to(&ct, 500));
    }

    #[test]
    fn same_plaintext_fresh_randomness_differs() {
        let kp = ElGamalKeypair::generate();
        let (a, _) = kp.pubkey().encrypt(10);
        let (b, _) = kp.pubkey().encrypt(10);
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn homomorphic_add_and_subtract() {
        let kp = ElGamalKeypair::generate();
        let (a, _) = kp.pubkey().encrypt(700);
        let (b, _) = kp.pubkey().encrypt(300);
        assert_eq!(kp.secret().decrypt(&(a + b)), Ok(1_000));
        assert_eq!(kp.secret().decrypt(&(a - b)), Ok(400));
        assert_eq!(kp.secret().decrypt(&a.add_amount(5)), Ok(705));
        assert_eq!(kp.secret().decrypt(&a.subtract_amount(700)), Ok(0));
        assert_eq!(kp.secret().decrypt(&Ciphertext::zero()), Ok(0));
    }

    #[test]
    fn zero_randomness_rejected() {
        let kp = ElGamalKeypair::generate();
        assert_eq!(
            kp.pubkey().encrypt_with(1, &Scalar::ZERO),
            Err(InputError::InvalidRandomness)
        );
    }

    #[test]
    fn ciphertext_bytes_round_trip() {
        let kp = ElGamalKeypair::generate();
        let (ct, _) = kp.pubkey().encrypt(77);
        let bytes = ct.to_bytes();
        assert_eq!(bytes.len(), 64);
        assert_eq!(Ciphertext::from_bytes(&bytes).unwrap(), ct);
        assert!(matches!(
            Ciphertext::from_bytes(&bytes[..63]),
            Err(InputError::InvalidLength { actual: 63, .. })
        ));
    }

    #[test]
    fn ciphertext_commitment_is_pedersen() {
        let kp = ElGamalKeypair::generate();
        let r = random_scalar();
        let ct = kp.pubkey().encrypt_with(31, &r).unwrap();
        assert_eq!(
            ct.pedersen_commitment(),
            crate::crypto::pedersen::commit(31, &r).unwrap()
        );
    }

    #[test]
    fn secret_key_bytes_round_trip_and_zero_rejected() {
        let kp = ElGamalKeypair::generate();
        let restored = ElGamalSecretKey::from_bytes(&kp.secret().to_bytes()).unwrap();
        assert_eq!(restored.pubkey(), *kp.pubkey());
        assert!(ElGamalSecretKey::from_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn identity_pubkey_rejected() {
        let identity = RistrettoPoint::identity().compress().to_bytes();
        assert!(ElGamalPubkey::from_bytes(&identity).is_err());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = ElGamalKeypair::generate();
        let rendered = format!("{:?}", kp);
        assert!(!rendered.contains(&hex::encode(kp.secret().to_bytes())));
    }
}
