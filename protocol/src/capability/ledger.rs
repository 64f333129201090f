//! The read-only ledger seam.
//!
//! The crate needs exactly one thing from the ledger: the data of an account
//! at a given commitment level, or the fact that it does not exist. Wire the
//! real RPC client in by implementing [`LedgerQuery`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::config::CommitmentLevel;
use crate::instruction::Address;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger rpc error: {0}")]
    Rpc(String),

    #[error("ledger query timed out")]
    Timeout,
}

#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Account data, or `None` if no account lives at `address`.
    async fn fetch_account(
        &self,
        address: &Address,
        commitment: CommitmentLevel,
    ) -> Result<Option<Vec<u8>>, LedgerError>;
}

/// A ledger held in memory, for tests and local tooling.
///
/// Counts every query so callers can assert on caching behaviour, and can
/// be told to fail or to answer slowly.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: RwLock<HashMap<Address, Vec<u8>>>,
    failure: RwLock<Option<LedgerError>>,
    latency: RwLock<Option<Duration>>,
    queries: AtomicUsize,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_account(&self, address: Address, data: Vec<u8>) {
        self.accounts.write().insert(address, data);
    }

    pub fn remove_account(&self, address: &Address) {
        self.accounts.write().remove(address);
    }

    /// Make every subsequent query fail with `error`; `None` heals it.
    pub fn fail_with(&self, error: Option<LedgerError>) {
        *self.failure.write() = error;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerQuery for InMemoryLedger {
    async fn fetch_account(
        &self,
        address: &Address,
        _commitment: CommitmentLevel,
    ) -> Result<Option<Vec<u8>>, LedgerError> {
        self.queries.fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failure.read().clone();
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(self.accounts.read().get(address).cloned())
    }
}
