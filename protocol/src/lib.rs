// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Cloak Protocol — Confidential Balances
//!
//! Two parties move token value on a ledger while the amount and the
//! resulting balances stay hidden, and anyone can still check that no value
//! was created or destroyed and no balance went negative.
//!
//! Balances are twisted ElGamal ciphertexts over Ristretto. Every operation
//! that changes one comes with zero-knowledge proofs: Bulletproof range
//! proofs for "not negative", Sigma protocols for "well formed" and "same
//! value". This crate builds those proofs, verifies them locally when it has
//! to, and produces the ledger instructions. It never submits transactions.
//!
//! ## Architecture
//!
//! ```text
//!            transfer  (ConfidentialTransferManager)
//!             /      \
//!    capability       zkp  (range, validity, equality, transfer bundle)
//!   (feature gate)     |
//!             \      crypto  (Pedersen, ElGamal, AES balances, transcripts)
//!              \      /
//!            instruction  (addresses, token + verifier instructions)
//! ```
//!
//! - **crypto** — Keys, commitments, ciphertexts. Pure functions.
//! - **zkp** — Proof construction and local verification. Pure functions.
//! - **capability** — Is the on-chain verifier live? The only async I/O.
//! - **transfer** — Configure, deposit, withdraw, transfer, apply pending.
//! - **instruction** — What the external client submits.
//! - **config** — Wire sizes, well-known addresses, runtime tunables.
//! - **telemetry** — Optional `tracing` subscriber setup.

pub mod capability;
pub mod config;
pub mod crypto;
pub mod instruction;
pub mod telemetry;
pub mod transfer;
pub mod zkp;
