//! # Capability Detection
//!
//! Decides, per network, whether the on-chain proof verification program is
//! switched on. The answer comes from a feature-gate account: if the account
//! exists the feature is active.
//!
//! ```text
//!   check_feature_gate(id)
//!        |
//!        v
//!   FeatureCache --hit (age < TTL)--> FeatureStatus
//!        | miss
//!        v
//!   per-id async lock (concurrent misses wait here)
//!        |
//!        v
//!   LedgerQuery::fetch_account --> FeatureStatus --> cache
//! ```
//!
//! Query failures are cached like any other answer, as `activated = false`
//! with the error message attached, so a failing endpoint is asked at most
//! once per TTL. Whether such a status is fatal is decided by the caller.
//!
//! This is the only part of the crate that performs I/O, and all of it goes
//! through the [`LedgerQuery`] trait.

pub mod cache;
pub mod clock;
pub mod detector;
pub mod ledger;
pub mod monitor;

pub use cache::FeatureCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use detector::FeatureDetector;
pub use ledger::{InMemoryLedger, LedgerError, LedgerQuery};
pub use monitor::MonitorHandle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the detector knows about one feature gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub activated: bool,
    pub last_checked: DateTime<Utc>,
    pub activation_slot: Option<u64>,
    /// Set when the lookup itself failed; `activated` is then false.
    pub error: Option<String>,
}

impl FeatureStatus {
    pub fn active(checked: DateTime<Utc>, activation_slot: Option<u64>) -> Self {
        Self {
            activated: true,
            last_checked: checked,
            activation_slot,
            error: None,
        }
    }

    pub fn inactive(checked: DateTime<Utc>) -> Self {
        Self {
            activated: false,
            last_checked: checked,
            activation_slot: None,
            error: None,
        }
    }

    pub fn failed(checked: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            activated: false,
            last_checked: checked,
            activation_slot: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Activation slot stored in a feature account: `Option<u64>` as
/// `[tag, slot LE]`. Anything else reads as "no slot recorded".
pub fn parse_activation_slot(data: &[u8]) -> Option<u64> {
    match data {
        [1, rest @ ..] if rest.len() >= 8 => {
            let mut slot = [0u8; 8];
            slot.copy_from_slice(&rest[..8]);
            Some(u64::from_le_bytes(slot))
        }
        _ => None,
    }
}
