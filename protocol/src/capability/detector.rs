//! Feature-gate lookups with caching and miss coalescing.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::cache::FeatureCache;
use super::clock::SystemClock;
use super::ledger::LedgerQuery;
use super::{parse_activation_slot, FeatureStatus};
use crate::config::{CommitmentLevel, DetectorConfig};
use crate::instruction::Address;

/// Answers "is this feature active?" for one network.
///
/// Cheap to share: wrap it in an `Arc` and hand clones to every caller (the
/// monitor requires this).
pub struct FeatureDetector {
    ledger: Arc<dyn LedgerQuery>,
    cache: Arc<FeatureCache>,
    commitment: CommitmentLevel,
    poll_interval: Duration,
    in_flight: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl FeatureDetector {
    pub fn new(ledger: Arc<dyn LedgerQuery>, cache: Arc<FeatureCache>, config: &DetectorConfig) -> Self {
        Self {
            ledger,
            cache,
            commitment: config.commitment,
            poll_interval: config.poll_interval(),
            in_flight: DashMap::new(),
        }
    }

    /// Default configuration and a wall-clock cache.
    pub fn with_defaults(ledger: Arc<dyn LedgerQuery>) -> Self {
        let config = DetectorConfig::default();
        let cache = Arc::new(FeatureCache::from_config(&config, Arc::new(SystemClock)));
        Self::new(ledger, cache, &config)
    }

    pub fn cache(&self) -> &Arc<FeatureCache> {
        &self.cache
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Status of `feature`, from cache when fresh.
    ///
    /// Concurrent callers missing on the same id share one ledger query: the
    /// first takes the id's lock and queries, the rest wait on the lock and
    /// then find the fresh entry.
    pub async fn check_feature_gate(&self, feature: &Address) -> FeatureStatus {
        let key = feature.to_string();
        if let Some(status) = self.cache.get(&key) {
            debug!(feature = %key, activated = status.activated, "feature status from cache");
            return status;
        }

        let lock = self.lock_for(&key);
        let status = {
            let _guard = lock.lock().await;
            match self.cache.get(&key) {
                Some(status) => status,
                None => self.query_and_store(feature, &key).await,
            }
        };
        self.release(&key, lock);
        status
    }

    /// Query the ledger regardless of the cache, and store the answer.
    pub async fn refresh(&self, feature: &Address) -> FeatureStatus {
        let key = feature.to_string();
        let lock = self.lock_for(&key);
        let status = {
            let _guard = lock.lock().await;
            self.query_and_store(feature, &key).await
        };
        self.release(&key, lock);
        status
    }

    /// Like [`refresh`](Self::refresh), except that a failed answer still
    /// within its TTL is returned as is. A ledger that is down is asked once
    /// per TTL, however often this is called.
    pub(crate) async fn poll(&self, feature: &Address) -> FeatureStatus {
        let key = feature.to_string();
        let lock = self.lock_for(&key);
        let status = {
            let _guard = lock.lock().await;
            match self.cache.get(&key) {
                Some(status) if status.is_error() => {
                    debug!(feature = %key, "cached failure still fresh, skipping query");
                    status
                }
                _ => self.query_and_store(feature, &key).await,
            }
        };
        self.release(&key, lock);
        status
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the per-id lock once nobody else holds a reference to it.
    fn release(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        drop(lock);
        self.in_flight.remove_if(key, |_, l| Arc::strong_count(l) == 1);
    }

    async fn query_and_store(&self, feature: &Address, key: &str) -> FeatureStatus {
        let status = self.query(feature).await;
        self.cache.insert(key, status.clone());
        status
    }

    async fn query(&self, feature: &Address) -> FeatureStatus {
        let now = self.cache.now();
        match self.ledger.fetch_account(feature, self.commitment).await {
            Ok(Some(data)) => {
                let slot = parse_activation_slot(&data);
                info!(feature = %feature, activation_slot = ?slot, "feature gate active");
                FeatureStatus::active(now, slot)
            }
            Ok(None) => {
                debug!(feature = %feature, "feature gate not active");
                FeatureStatus::inactive(now)
            }
            Err(e) => {
                warn!(feature = %feature, error = %e, "feature gate query failed");
                FeatureStatus::failed(now, e.to_string())
            }
        }
    }
}

impl std::fmt::Debug for FeatureDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureDetector")
            .field("cache", &self.cache)
            .field("commitment", &self.commitment)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{InMemoryLedger, LedgerError, ManualClock};
    use crate::config::FEATURE_CACHE_TTL;

    const FEATURE: Address = Address::new([9u8; 32]);

    fn setup() -> (Arc<InMemoryLedger>, Arc<ManualClock>, Arc<FeatureDetector>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::default());
        let config = DetectorConfig::default();
        let cache = Arc::new(FeatureCache::from_config(&config, clock.clone()));
        let detector = Arc::new(FeatureDetector::new(ledger.clone(), cache, &config));
        (ledger, clock, detector)
    }

    fn feature_account(slot: u64) -> Vec<u8> {
        let mut data = vec![1u8];
        data.extend_from_slice(&slot.to_le_bytes());
        data
    }

    #[tokio::test]
    async fn existing_account_means_active() {
        let (ledger, _, detector) = setup();
        ledger.set_account(FEATURE, feature_account(777));

        let status = detector.check_feature_gate(&FEATURE).await;
        assert!(status.activated);
        assert_eq!(status.activation_slot, Some(777));
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn missing_account_means_inactive() {
        let (_, _, detector) = setup();
        let status = detector.check_feature_gate(&FEATURE).await;
        assert!(!status.activated);
        assert!(status.error.is_none());
    }

    #[tokio::test]
    async fn cached_within_ttl_requeried_after() {
        let (ledger, clock, detector) = setup();

        detector.check_feature_gate(&FEATURE).await;
        clock.advance(Duration::from_secs(60));
        detector.check_feature_gate(&FEATURE).await;
        assert_eq!(ledger.query_count(), 1);

        clock.advance(FEATURE_CACHE_TTL);
        detector.check_feature_gate(&FEATURE).await;
        assert_eq!(ledger.query_count(), 2);
    }

    #[tokio::test]
    async fn errors_are_cached_for_the_ttl() {
        let (ledger, clock, detector) = setup();
        ledger.fail_with(Some(LedgerError::Rpc("503".into())));

        let first = detector.check_feature_gate(&FEATURE).await;
        assert!(!first.activated);
        assert_eq!(first.error.as_deref(), Some("ledger rpc error: 503"));

        ledger.fail_with(None);
        ledger.set_account(FEATURE, vec![]);
        let second = detector.check_feature_gate(&FEATURE).await;
        assert!(second.is_error(), "error answer served until it expires");
        assert_eq!(ledger.query_count(), 1);

        clock.advance(FEATURE_CACHE_TTL);
        assert!(detector.check_feature_gate(&FEATURE).await.activated);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_coalesce() {
        let (ledger, _, detector) = setup();
        ledger.set_latency(Some(Duration::from_millis(50)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let detector = detector.clone();
                tokio::spawn(async move { detector.check_feature_gate(&FEATURE).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(ledger.query_count(), 1);
        assert!(detector.in_flight.is_empty());
    }

    #[tokio::test]
    async fn distinct_ids_query_independently() {
        let (ledger, _, detector) = setup();
        detector.check_feature_gate(&Address::new([1u8; 32])).await;
        detector.check_feature_gate(&Address::new([2u8; 32])).await;
        assert_eq!(ledger.query_count(), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let (ledger, _, detector) = setup();
        assert!(!detector.check_feature_gate(&FEATURE).await.activated);

        ledger.set_account(FEATURE, vec![0]);
        assert!(detector.refresh(&FEATURE).await.activated);
        assert!(detector.check_feature_gate(&FEATURE).await.activated);
        assert_eq!(ledger.query_count(), 2);
    }

    #[tokio::test]
    async fn poll_holds_off_on_fresh_failure() {
        let (ledger, clock, detector) = setup();
        ledger.fail_with(Some(LedgerError::Timeout));

        assert!(detector.poll(&FEATURE).await.is_error());
        assert!(detector.poll(&FEATURE).await.is_error());
        assert_eq!(ledger.query_count(), 1);

        ledger.fail_with(None);
        ledger.set_account(FEATURE, vec![]);
        clock.advance(FEATURE_CACHE_TTL);
        assert!(detector.poll(&FEATURE).await.activated);
        assert_eq!(ledger.query_count(), 2);
    }

    #[tokio::test]
    async fn poll_requeries_healthy_answers() {
        let (ledger, _, detector) = setup();
        assert!(!detector.poll(&FEATURE).await.activated);

        ledger.set_account(FEATURE, vec![]);
        assert!(detector.poll(&FEATURE).await.activated);
        assert_eq!(ledger.query_count(), 2);
    }
}
