//! # Confidential Transfer Orchestration
//!
//! The layer callers use. It validates requests, decides (with the
//! capability detector) where proofs get verified, builds them, and returns
//! an [`OperationPlan`]: the instructions for an external client to submit.
//! It never submits anything itself.
//!
//! - **manager** — [`ConfidentialTransferManager`] and plan assembly.
//! - **types** — per-operation requests and outputs.
//! - **error** — [`TransferError`].

pub mod error;
pub mod manager;
pub mod types;

pub use error::TransferError;
pub use manager::{context_state_address, ConfidentialTransferManager};
pub use types::{
    ApplyPendingBalanceRequest, ConfigureAccountOutput, ConfigureAccountRequest, DepositOutput,
    DepositRequest, OperationPlan, TransferOutput, TransferRequest, WithdrawOutput,
    WithdrawRequest,
};
