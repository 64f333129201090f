//! # Feature Gate Monitor
//!
//! Polls one feature gate on a timer and reports activation changes.
//!
//! ```text
//!   poll ──> status ──> changed since last poll? ──yes──> callback
//!    ^                                                       |
//!    └──────────── sleep(interval) <── cancelled? ──no───────┘
//! ```
//!
//! - The first successful poll records the starting state; the callback
//!   fires only when a later poll disagrees with the last recorded state.
//! - Polls that fail are logged and skipped. A transient RPC error is not
//!   evidence that a feature was switched off.
//! - A failed answer is cached like any other, and while it is fresh the
//!   monitor reuses it instead of asking the ledger again. An unreachable
//!   endpoint sees one query per cache TTL, not one per interval.
//! - The callback runs inline in the polling task, so invocations never
//!   overlap and the next sleep starts only after it returns.
//! - [`MonitorHandle::cancel`] is idempotent. A callback already running
//!   finishes, but the loop is not re-armed. Dropping the handle cancels
//!   too, since the shutdown channel's sender goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::detector::FeatureDetector;
use super::FeatureStatus;
use crate::instruction::Address;

/// Cancellation handle for a running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    cancelled: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop polling. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let _ = self.shutdown.send(true);
            debug!("feature monitor cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the polling task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the polling task to exit.
    pub async fn shutdown(self) {
        self.cancel();
        let MonitorHandle { task, shutdown, .. } = self;
        let _ = task.await;
        drop(shutdown);
    }
}

impl FeatureDetector {
    /// Watch `feature`, calling `callback` whenever its activation flips.
    ///
    /// `interval` defaults to the detector's configured poll interval.
    /// Healthy polls go to the ledger and refresh the shared cache; see the
    /// module docs for how failures are throttled.
    pub fn monitor_feature_gate<F>(
        self: &Arc<Self>,
        feature: Address,
        interval: Option<Duration>,
        mut callback: F,
    ) -> MonitorHandle
    where
        F: FnMut(&FeatureStatus) + Send + 'static,
    {
        let interval = interval.unwrap_or_else(|| self.poll_interval());
        let (shutdown, mut stop) = watch::channel(false);
        let cancelled = Arc::new(AtomicBool::new(false));

        let detector = Arc::clone(self);
        let flag = Arc::clone(&cancelled);

        let task = tokio::spawn(async move {
            info!(feature = %feature, interval_ms = interval.as_millis() as u64, "feature monitor started");
            let mut last: Option<bool> = None;

            loop {
                if flag.load(Ordering::SeqCst) {
                    break;
                }

                let status = tokio::select! {
                    status = detector.poll(&feature) => status,
                    _ = stop.changed() => break,
                };

                if let Some(error) = &status.error {
                    warn!(feature = %feature, error = %error, "feature monitor poll failed");
                } else {
                    match last {
                        Some(previous) if previous != status.activated => {
                            if flag.load(Ordering::SeqCst) {
                                break;
                            }
                            info!(
                                feature = %feature,
                                activated = status.activated,
                                "feature gate changed state"
                            );
                            callback(&status);
                        }
                        Some(_) => {}
                        None => debug!(feature = %feature, activated = status.activated, "feature monitor baseline"),
                    }
                    last = Some(status.activated);
                }

                if flag.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }
            }

            debug!(feature = %feature, "feature monitor stopped");
        });

        MonitorHandle {
            cancelled,
            shutdown,
            task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FeatureCache, InMemoryLedger, LedgerError, ManualClock};
    use crate::config::{DetectorConfig, FEATURE_CACHE_TTL};
    use parking_lot::Mutex;

    const FEATURE: Address = Address::new([4u8; 32]);
    const TICK: Duration = Duration::from_secs(30);

    fn setup() -> (Arc<InMemoryLedger>, Arc<ManualClock>, Arc<FeatureDetector>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::default());
        let config = DetectorConfig::default();
        let cache = Arc::new(FeatureCache::from_config(&config, clock.clone()));
        let detector = Arc::new(FeatureDetector::new(ledger.clone(), cache, &config));
        (ledger, clock, detector)
    }

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, impl FnMut(&FeatureStatus) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |s: &FeatureStatus| sink.lock().push(s.activated))
    }

    /// Let the monitor task run up to its next sleep.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn callback_only_on_transitions() {
        let (ledger, _, detector) = setup();
        let (seen, callback) = recorder();
        let handle = detector.monitor_feature_gate(FEATURE, Some(TICK), callback);

        settle().await;
        tokio::time::advance(TICK).await;
        settle().await;
        assert!(seen.lock().is_empty(), "steady state reports nothing");

        ledger.set_account(FEATURE, vec![]);
        tokio::time::advance(TICK).await;
        settle().await;
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(*seen.lock(), vec![true]);

        ledger.remove_account(&FEATURE);
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(*seen.lock(), vec![true, false]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_stops_polling() {
        let (ledger, _, detector) = setup();
        let (seen, callback) = recorder();
        let handle = detector.monitor_feature_gate(FEATURE, Some(TICK), callback);
        settle().await;
        let polls = ledger.query_count();
        assert_eq!(polls, 1);

        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());

        ledger.set_account(FEATURE, vec![]);
        for _ in 0..5 {
            tokio::time::advance(TICK).await;
            settle().await;
        }
        assert_eq!(ledger.query_count(), polls);
        assert!(seen.lock().is_empty());
        assert!(handle.is_finished());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_polls_do_not_flip_state() {
        let (ledger, clock, detector) = setup();
        ledger.set_account(FEATURE, vec![]);
        let (seen, callback) = recorder();
        let handle = detector.monitor_feature_gate(FEATURE, Some(TICK), callback);
        settle().await;

        ledger.fail_with(Some(LedgerError::Timeout));
        tokio::time::advance(TICK).await;
        settle().await;
        ledger.fail_with(None);
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(ledger.query_count(), 2, "cached failure reused");

        clock.advance(FEATURE_CACHE_TTL);
        tokio::time::advance(TICK).await;
        settle().await;

        assert!(seen.lock().is_empty());
        assert_eq!(ledger.query_count(), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failing_endpoint_polled_once_per_ttl() {
        let (ledger, clock, detector) = setup();
        ledger.fail_with(Some(LedgerError::Timeout));
        let (seen, callback) = recorder();
        let handle = detector.monitor_feature_gate(FEATURE, Some(TICK), callback);
        settle().await;
        assert_eq!(ledger.query_count(), 1);

        for _ in 0..4 {
            tokio::time::advance(TICK).await;
            settle().await;
        }
        assert_eq!(ledger.query_count(), 1);
        assert!(detector.cache().get(&FEATURE.to_string()).is_some_and(|s| s.is_error()));

        clock.advance(FEATURE_CACHE_TTL);
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(ledger.query_count(), 2);

        ledger.fail_with(None);
        ledger.set_account(FEATURE, vec![]);
        clock.advance(FEATURE_CACHE_TTL);
        tokio::time::advance(TICK).await;
        settle().await;
        assert_eq!(ledger.query_count(), 3);
        assert!(seen.lock().is_empty(), "first good answer is the baseline");

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_task() {
        let (ledger, _, detector) = setup();
        let (_, callback) = recorder();
        let handle = detector.monitor_feature_gate(FEATURE, Some(TICK), callback);
        settle().await;
        drop(handle);

        for _ in 0..3 {
            tokio::time::advance(TICK).await;
            settle().await;
        }
        assert_eq!(ledger.query_count(), 1);
    }
}
