use thiserror::Error;

use crate::crypto::{EncryptionError, InputError};
use crate::instruction::Address;
use crate::zkp::{ProofError, VerifyError};

/// Errors from the confidential transfer manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error("decryptable balance: {0}")]
    Encryption(#[from] EncryptionError),

    /// The feature gate could not be read and the caller demanded the
    /// on-chain verifier.
    #[error("capability query failed for feature {feature}: {message}")]
    CapabilityQuery { feature: Address, message: String },

    /// The caller demanded the on-chain verifier but it is not enabled.
    #[error("zk proof program required but feature {feature} is not active")]
    ModeInconsistency { feature: Address },

    /// A freshly built proof failed local verification.
    #[error("local proof verification failed: {0}")]
    LocalVerification(VerifyError),
}
