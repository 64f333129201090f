//! Bounded TTL cache of feature statuses.
//!
//! Entries expire `ttl` after their `last_checked` time as read from the
//! injected [`Clock`]. When a new id would push the cache past `capacity`,
//! the id inserted longest ago is evicted, regardless of how often it is
//! read. Re-inserting an id counts as a fresh insertion.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::trace;

use super::clock::{Clock, SystemClock};
use super::FeatureStatus;
use crate::config::{DetectorConfig, FEATURE_CACHE_CAPACITY, FEATURE_CACHE_TTL};

#[derive(Default)]
struct Entries {
    statuses: HashMap<String, FeatureStatus>,
    order: VecDeque<String>,
}

pub struct FeatureCache {
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
    entries: Mutex<Entries>,
}

impl FeatureCache {
    pub fn new(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn from_config(config: &DetectorConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(config.cache_ttl(), config.cache_capacity, clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, status: &FeatureStatus, now: DateTime<Utc>) -> bool {
        match (now - status.last_checked).to_std() {
            Ok(age) => age < self.ttl,
            // Checked "in the future": the clock moved backwards.
            Err(_) => true,
        }
    }

    /// The cached status for `id`, if present and younger than the TTL.
    pub fn get(&self, id: &str) -> Option<FeatureStatus> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        entries
            .statuses
            .get(id)
            .filter(|status| self.is_fresh(status, now))
            .cloned()
    }

    pub fn insert(&self, id: &str, status: FeatureStatus) {
        let mut entries = self.entries.lock();
        if entries.statuses.remove(id).is_some() {
            entries.order.retain(|k| k != id);
        }
        while entries.statuses.len() >= self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.statuses.remove(&oldest);
            trace!(feature = %oldest, "evicted feature status");
        }
        entries.order.push_back(id.to_string());
        entries.statuses.insert(id.to_string(), status);
    }

    pub fn invalidate(&self, id: &str) {
        let mut entries = self.entries.lock();
        if entries.statuses.remove(id).is_some() {
            entries.order.retain(|k| k != id);
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.statuses.clear();
        entries.order.clear();
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().statuses.contains_key(id)
    }
}

impl Default for FeatureCache {
    fn default() -> Self {
        Self::new(FEATURE_CACHE_TTL, FEATURE_CACHE_CAPACITY, Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for FeatureCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
