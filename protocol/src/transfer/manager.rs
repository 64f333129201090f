//! # Confidential Transfer Manager
//!
//! Turns a requested operation into the proofs and ledger instructions that
//! carry it out.
//!
//! ```text
//!   request ──> validate inputs ──> resolve ProofMode ──> build proofs
//!                                        |                    |
//!                                 FeatureDetector             v
//!                                              local? ── verify here
//!                                                |
//!                                   zk ──> inline or split plan
//! ```
//!
//! ## Mode resolution
//!
//! | requested                | gate active | gate inactive     | query failed      |
//! |--------------------------|-------------|-------------------|-------------------|
//! | `LocalOnly`              | local       | local             | local             |
//! | `ZkProgramOnly`          | zk          | ModeInconsistency | CapabilityQuery   |
//! | `ZkProgramWithFallback`  | zk          | local + warning   | local + warning   |
//!
//! ## Instruction layout
//!
//! In zk mode the token instruction comes first and its verifier
//! instructions follow at offsets 1, 2, ... in the same transaction. When
//! that transaction would exceed the size limit, each verifier instruction
//! is pointed at its own context-state account and moved to
//! `proof_instructions`, and the token instruction references the accounts.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::TransferError;
use super::types::*;
use crate::capability::{Clock, FeatureCache, FeatureDetector, LedgerQuery};
use crate::config::{ManagerConfig, ProtocolConfig, DEFAULT_MAX_PENDING_BALANCE_CREDITS};
use crate::crypto::pedersen::{commit_unchecked, random_scalar};
use crate::crypto::{AeKey, InputError};
use crate::instruction::proof::{self as proof_ix, with_context};
use crate::instruction::token::{self, ProofLocation, TokenAccountKeys, TransferProofLocations};
use crate::instruction::{estimate_transaction_size, Address, Instruction};
use crate::zkp::equality::{prove_equality, verify_equality};
use crate::zkp::pubkey_validity::verify_pubkey_validity;
use crate::zkp::range::{prove_range, verify_range};
use crate::zkp::validity::{prove_validity, verify_validity};
use crate::zkp::{
    build_pubkey_validity_proof, build_transfer_proof, verify_transfer_local, ProofMode,
    TransferProofInput, VerifyError,
};

const CONTEXT_STATE_DOMAIN: &[u8] = b"cloak-protocol/context-state";

/// Deterministic context-state address for one verifier instruction.
pub fn context_state_address(owner: &Address, instruction: &Instruction) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(CONTEXT_STATE_DOMAIN);
    hasher.update(owner.as_bytes());
    hasher.update(instruction.program_id.as_bytes());
    hasher.update(&instruction.data);
    Address::new(hasher.finalize().into())
}

/// Builds confidential token operations.
pub struct ConfidentialTransferManager {
    detector: Arc<FeatureDetector>,
    config: ManagerConfig,
}

impl ConfidentialTransferManager {
    pub fn new(detector: Arc<FeatureDetector>, config: ManagerConfig) -> Self {
        Self { detector, config }
    }

    /// Build the detector, its cache, and the manager from one configuration
    /// document, sharing `ledger` and `clock`.
    pub fn from_config(
        ledger: Arc<dyn LedgerQuery>,
        clock: Arc<dyn Clock>,
        config: &ProtocolConfig,
    ) -> Self {
        let cache = Arc::new(FeatureCache::from_config(&config.detector, clock));
        let detector = Arc::new(FeatureDetector::new(ledger, cache, &config.detector));
        debug!(
            token_program = %config.manager.token_program_id,
            cache_ttl_secs = config.detector.cache_ttl_secs,
            "transfer manager configured"
        );
        Self::new(detector, config.manager.clone())
    }

    pub fn detector(&self) -> &Arc<FeatureDetector> {
        &self.detector
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Mode resolution
    // -----------------------------------------------------------------------

    /// The mode an operation actually runs in, given the live feature gate.
    pub async fn resolve_mode(
        &self,
        requested: &ProofMode,
        warnings: &mut Vec<String>,
    ) -> Result<ProofMode, TransferError> {
        let (verifier, fallback) = match requested {
            ProofMode::LocalOnly => return Ok(ProofMode::LocalOnly),
            ProofMode::ZkProgramOnly(v) => (v, false),
            ProofMode::ZkProgramWithFallback(v) => (v, true),
        };

        let status = self.detector.check_feature_gate(&verifier.feature_id).await;
        if status.activated {
            return Ok(*requested);
        }

        let feature = verifier.feature_id;
        match (status.error, fallback) {
            (Some(message), false) => Err(TransferError::CapabilityQuery { feature, message }),
            (None, false) => Err(TransferError::ModeInconsistency { feature }),
            (Some(message), true) => {
                warn!(feature = %feature, error = %message, "capability query failed, using local verification");
                warnings.push(format!(
                    "could not determine whether feature {feature} is active ({message}); proofs were verified locally"
                ));
                Ok(ProofMode::LocalOnly)
            }
            (None, true) => {
                warn!(feature = %feature, "zk proof program not active, using local verification");
                warnings.push(format!(
                    "zk proof program feature {feature} is not active; proofs were verified locally"
                ));
                Ok(ProofMode::LocalOnly)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Register an ElGamal key and a decryptable zero balance on an account.
    pub async fn configure_account(
        &self,
        request: ConfigureAccountRequest<'_>,
    ) -> Result<ConfigureAccountOutput, TransferError> {
        let keypair = request.elgamal_keypair;
        let ae_key = AeKey::derive(keypair.secret());
        if ae_key.decrypt(&request.decryptable_zero_balance)? != 0 {
            return Err(InputError::BalanceMismatch("decryptable zero balance does not decrypt to zero").into());
        }

        let mut warnings = Vec::new();
        let mode = self.resolve_mode(&request.mode, &mut warnings).await?;

        let proof = build_pubkey_validity_proof(keypair)?;
        let verifiers = match mode.verifier() {
            Some(v) => vec![proof_ix::verify_pubkey_validity(v.program_id, keypair.pubkey(), &proof, None)],
            None => {
                local(verify_pubkey_validity(&proof, keypair.pubkey()))?;
                Vec::new()
            }
        };

        let max_credits = request
            .maximum_pending_balance_credit_counter
            .unwrap_or(DEFAULT_MAX_PENDING_BALANCE_CREDITS);
        let plan = self.assemble(&request.keys, &mode, verifiers, warnings, |locations| {
            token::configure_account(
                self.config.token_program_id,
                &request.keys,
                keypair.pubkey(),
                &request.decryptable_zero_balance,
                max_credits,
                location(locations, 0),
            )
        });

        info!(account = %request.keys.token_account, external = plan.requires_external_verifier, "configure account planned");
        Ok(ConfigureAccountOutput {
            plan,
            pubkey_validity_proof: proof,
        })
    }

    /// Move `amount` of public tokens into the account's confidential balance.
    pub async fn deposit(&self, request: DepositRequest<'_>) -> Result<DepositOutput, TransferError> {
        let mut warnings = Vec::new();
        let mode = self.resolve_mode(&request.mode, &mut warnings).await?;

        let pubkey = request.elgamal_pubkey;
        let randomness = random_scalar();
        let encrypted_amount = pubkey.encrypt_with(request.amount, &randomness)?;
        let proof = prove_validity(&encrypted_amount, pubkey, request.amount, &randomness)?;

        let verifiers = match mode.verifier() {
            Some(v) => vec![proof_ix::verify_ciphertext_validity(
                v.program_id,
                pubkey,
                &encrypted_amount,
                &proof,
                None,
            )],
            None => {
                local(verify_validity(&proof, pubkey, &encrypted_amount))?;
                Vec::new()
            }
        };

        let plan = self.assemble(&request.keys, &mode, verifiers, warnings, |locations| {
            token::deposit(
                self.config.token_program_id,
                &request.keys,
                request.amount,
                request.decimals,
                &encrypted_amount,
                location(locations, 0),
            )
        });

        info!(account = %request.keys.token_account, external = plan.requires_external_verifier, "deposit planned");
        Ok(DepositOutput {
            plan,
            encrypted_amount,
            validity_proof: proof,
        })
    }

    /// Withdraw `amount` from the confidential balance.
    ///
    /// The withdrawal must not exceed the current balance; this is checked
    /// here, before any proof is built.
    pub async fn withdraw(&self, request: WithdrawRequest<'_>) -> Result<WithdrawOutput, TransferError> {
        let keypair = request.elgamal_keypair;
        let ae_key = AeKey::derive(keypair.secret());
        let available = ae_key.decrypt(&request.current_decryptable_balance)?;

        if !keypair.secret().decrypts_to(&request.current_balance, available) {
            return Err(InputError::BalanceMismatch("encrypted and decryptable balances disagree").into());
        }
        let remaining = available
            .checked_sub(request.amount)
            .ok_or(InputError::InsufficientBalance {
                available,
                requested: request.amount,
            })?;
        if ae_key.decrypt(&request.new_decryptable_balance)? != remaining {
            return Err(InputError::BalanceMismatch(
                "new decryptable balance is not the current balance minus the withdrawal",
            )
            .into());
        }

        let mut warnings = Vec::new();
        let mode = self.resolve_mode(&request.mode, &mut warnings).await?;

        let new_balance = request.current_balance.subtract_amount(request.amount);
        let opening = random_scalar();
        let commitment = commit_unchecked(remaining, &opening);
        let equality_proof = prove_equality(keypair, &new_balance, &commitment, remaining, &opening)?;
        let range_proof = prove_range(remaining, &opening, &commitment)?;

        let verifiers = match mode.verifier() {
            Some(v) => vec![
                proof_ix::verify_ciphertext_commitment_equality(
                    v.program_id,
                    keypair.pubkey(),
                    &new_balance,
                    &commitment,
                    &equality_proof,
                    None,
                ),
                proof_ix::verify_range_proof(v.program_id, &commitment, &range_proof, None),
            ],
            None => {
                local(verify_equality(&equality_proof, keypair.pubkey(), &new_balance, &commitment))?;
                local(verify_range(&range_proof, &commitment))?;
                Vec::new()
            }
        };

        let plan = self.assemble(&request.keys, &mode, verifiers, warnings, |locations| {
            token::withdraw(
                self.config.token_program_id,
                &request.keys,
                request.amount,
                request.decimals,
                &request.new_decryptable_balance,
                location(locations, 0),
                location(locations, 1),
            )
        });

        info!(
            account = %request.keys.token_account,
            external = plan.requires_external_verifier,
            split = plan.is_split(),
            "withdraw planned"
        );
        Ok(WithdrawOutput {
            plan,
            new_balance,
            equality_proof,
            range_proof,
        })
    }

    /// Confidentially transfer `amount` from the source account to
    /// `destination`.
    pub async fn transfer(&self, request: TransferRequest<'_>) -> Result<TransferOutput, TransferError> {
        let keypair = request.source_keypair;
        let ae_key = AeKey::derive(keypair.secret());
        let available = ae_key.decrypt(&request.current_decryptable_balance)?;

        let remaining = available
            .checked_sub(request.amount)
            .ok_or(InputError::InsufficientBalance {
                available,
                requested: request.amount,
            })?;
        if ae_key.decrypt(&request.new_decryptable_balance)? != remaining {
            return Err(InputError::BalanceMismatch(
                "new decryptable balance is not the current balance minus the transfer",
            )
            .into());
        }

        let mut warnings = Vec::new();
        let mode = self.resolve_mode(&request.mode, &mut warnings).await?;

        let output = build_transfer_proof(
            TransferProofInput {
                source_balance: &request.source_balance,
                source_available: available,
                transfer_amount: request.amount,
                source_keypair: keypair,
                dest_pubkey: request.destination_pubkey,
                source_randomness: &random_scalar(),
            },
            &mode,
        )?;
        let bundle = output.bundle;

        if !mode.requires_external_verifier() {
            let check = verify_transfer_local(
                &bundle,
                &request.source_balance,
                keypair.pubkey(),
                request.destination_pubkey,
            );
            if let Some(error) = check.error {
                return Err(TransferError::LocalVerification(error));
            }
        }

        let destination_handle = bundle.dest_ciphertext.handle.compress().to_bytes();
        let plan = self.assemble(
            &request.keys,
            &mode,
            output.verifier_instructions,
            warnings,
            |locations| {
                token::transfer(
                    self.config.token_program_id,
                    &request.keys,
                    request.destination,
                    &bundle.encrypted_transfer_amount,
                    &destination_handle,
                    &request.new_decryptable_balance,
                    TransferProofLocations {
                        equality: location(locations, 0),
                        validity: location(locations, 1),
                        range: location(locations, 2),
                        amount_range: location(locations, 3),
                    },
                )
            },
        );

        info!(
            source = %request.keys.token_account,
            destination = %request.destination,
            external = plan.requires_external_verifier,
            split = plan.is_split(),
            "transfer planned"
        );
        Ok(TransferOutput { plan, bundle })
    }

    /// Fold pending credits into the available balance. No proofs involved.
    pub fn apply_pending_balance(&self, request: ApplyPendingBalanceRequest) -> OperationPlan {
        let ix = token::apply_pending_balance(
            self.config.token_program_id,
            &request.keys,
            request.expected_pending_balance_credit_counter,
            &request.new_decryptable_available_balance,
        );
        debug!(account = %request.keys.token_account, "apply pending balance planned");
        OperationPlan {
            instructions: vec![ix],
            ..OperationPlan::default()
        }
    }

    // -----------------------------------------------------------------------
    // Plan assembly
    // -----------------------------------------------------------------------

    fn assemble(
        &self,
        keys: &TokenAccountKeys,
        mode: &ProofMode,
        verifiers: Vec<Instruction>,
        warnings: Vec<String>,
        token_instruction: impl Fn(&[ProofLocation]) -> Instruction,
    ) -> OperationPlan {
        if !mode.requires_external_verifier() {
            return OperationPlan {
                instructions: vec![token_instruction(&[])],
                proof_instructions: Vec::new(),
                warnings,
                requires_external_verifier: false,
            };
        }

        let inline: Vec<ProofLocation> = (1..=verifiers.len())
            .map(|i| ProofLocation::InstructionOffset(i as i8))
            .collect();
        let mut instructions = vec![token_instruction(&inline)];
        instructions.extend(verifiers.iter().cloned());

        let size = estimate_transaction_size(&instructions);
        if size <= self.config.max_transaction_size {
            return OperationPlan {
                instructions,
                proof_instructions: Vec::new(),
                warnings,
                requires_external_verifier: true,
            };
        }

        debug!(
            size,
            limit = self.config.max_transaction_size,
            proofs = verifiers.len(),
            "transaction too large, moving proofs to context accounts"
        );
        let contexts: Vec<Address> = verifiers
            .iter()
            .map(|ix| context_state_address(&keys.owner, ix))
            .collect();
        let proof_instructions = verifiers
            .into_iter()
            .zip(&contexts)
            .map(|(ix, ctx)| with_context(ix, *ctx))
            .collect();
        let locations: Vec<ProofLocation> = contexts
            .into_iter()
            .map(ProofLocation::ContextStateAccount)
            .collect();

        OperationPlan {
            instructions: vec![token_instruction(&locations)],
            proof_instructions,
            warnings,
            requires_external_verifier: true,
        }
    }
}

fn location(locations: &[ProofLocation], index: usize) -> Option<ProofLocation> {
    locations.get(index).copied()
}

fn local(result: Result<(), VerifyError>) -> Result<(), TransferError> {
    result.map_err(TransferError::LocalVerification)
}

impl std::fmt::Debug for ConfidentialTransferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidentialTransferManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
