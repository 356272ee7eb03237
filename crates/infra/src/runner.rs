//! Scheduled scan runner.
//!
//! - Schedule: a full scan on startup, then every `interval`
//! - Trigger: `ScanTrigger::trigger()` requests an extra run; triggers are
//!   coalesced (bounded channel of one), so a burst yields one run
//! - Failures: a run with `success == false` is retried with bounded
//!   exponential backoff up to `max_retries`, then waits for the next tick
//! - Runs are serialized inside one runner

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::coordinator::{RecomputeCoordinator, ScanRequest};
use crate::store::OpsStore;

const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ScanRunner {
    pub interval: Duration,
    pub max_retries: u32,
    pub base_backoff: Duration,
    pub request: ScanRequest,
}

impl Default for ScanRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            request: ScanRequest::full(),
        }
    }
}

/// Cloneable trigger hook, e.g. for the HTTP layer.
#[derive(Debug, Clone)]
pub struct ScanTrigger {
    tx: mpsc::Sender<()>,
}

impl ScanTrigger {
    /// Request a run. Returns `false` when one is already pending (coalesced)
    /// or the runner has stopped.
    pub fn trigger(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

/// Handle for a running scan runner. Dropping it stops the runner.
#[derive(Debug)]
pub struct ScanRunnerHandle {
    shutdown: oneshot::Sender<()>,
    trigger: ScanTrigger,
    attempts: Arc<AtomicU64>,
    join: JoinHandle<()>,
}

impl ScanRunnerHandle {
    pub fn trigger(&self) -> bool {
        self.trigger.trigger()
    }

    pub fn trigger_handle(&self) -> ScanTrigger {
        self.trigger.clone()
    }

    /// Scan attempts started so far, retries included.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Stop the loop and wait for an in-flight scan to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

impl ScanRunner {
    /// Runner settings from config; `None` when no interval is configured.
    pub fn from_config(config: &EngineConfig) -> Option<Self> {
        config.scan_interval.map(|interval| Self {
            interval,
            max_retries: config.max_retries,
            base_backoff: config.base_backoff,
            request: ScanRequest::full(),
        })
    }

    /// Spawn the runner on the current tokio runtime.
    pub fn spawn<S>(&self, name: &'static str, coordinator: Arc<RecomputeCoordinator<S>>) -> ScanRunnerHandle
    where
        S: OpsStore + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let attempts = Arc::new(AtomicU64::new(0));

        let join = tokio::spawn(runner_loop(
            name,
            self.clone(),
            coordinator,
            shutdown_rx,
            trigger_rx,
            Arc::clone(&attempts),
        ));

        ScanRunnerHandle {
            shutdown: shutdown_tx,
            trigger: ScanTrigger { tx: trigger_tx },
            attempts,
            join,
        }
    }
}

async fn runner_loop<S>(
    name: &'static str,
    cfg: ScanRunner,
    coordinator: Arc<RecomputeCoordinator<S>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
    attempts: Arc<AtomicU64>,
) where
    S: OpsStore + ?Sized + 'static,
{
    info!(runner = name, interval_secs = cfg.interval.as_secs(), "scan runner started");

    // The first tick completes immediately: that is the startup run.
    let mut ticker = tokio::time::interval(cfg.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    'outer: loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => break,
            _ = ticker.tick() => {}
            Some(()) = trigger_rx.recv() => {}
        }

        let mut failures: u32 = 0;
        loop {
            attempts.fetch_add(1, Ordering::Relaxed);
            let stats = coordinator.run_scan(cfg.request.clone()).await;
            if stats.success {
                break;
            }

            failures += 1;
            if failures > cfg.max_retries {
                warn!(runner = name, failures, message = ?stats.message, "scan failed, waiting for next tick");
                break;
            }

            let wait = backoff(cfg.base_backoff, failures);
            warn!(
                runner = name,
                failures,
                backoff_ms = wait.as_millis() as u64,
                message = ?stats.message,
                "scan failed, retrying"
            );
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break 'outer,
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    info!(runner = name, "scan runner stopped");
}

/// `base * 2^(attempt-1)`, capped at ten seconds.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    base.saturating_mul(pow).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryOpsStore, StoreOperation};

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn coordinator(store: &Arc<InMemoryOpsStore>) -> Arc<RecomputeCoordinator<InMemoryOpsStore>> {
        Arc::new(RecomputeCoordinator::new(Arc::clone(store), EngineConfig::default()))
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff(base, 1), Duration::from_millis(250));
        assert_eq!(backoff(base, 2), Duration::from_millis(500));
        assert_eq!(backoff(base, 4), Duration::from_secs(2));
        assert_eq!(backoff(base, 9), MAX_BACKOFF);
        assert_eq!(backoff(base, 40), MAX_BACKOFF);
    }

    #[test]
    fn runner_is_disabled_without_interval() {
        assert!(ScanRunner::from_config(&EngineConfig::default()).is_none());

        let config = EngineConfig {
            scan_interval: Some(Duration::from_secs(60)),
            ..EngineConfig::default()
        };
        let runner = ScanRunner::from_config(&config).unwrap();
        assert_eq!(runner.interval, Duration::from_secs(60));
        assert_eq!(runner.max_retries, 5);
    }

    #[tokio::test]
    async fn runs_on_startup_and_on_trigger() {
        let store = InMemoryOpsStore::arc();
        let runner = ScanRunner::default();
        let handle = runner.spawn("test-runner", coordinator(&store));

        assert!(eventually(|| store.snapshots().len() == 1).await);
        assert_eq!(handle.attempts(), 1);

        assert!(handle.trigger());
        assert!(eventually(|| handle.attempts() == 2).await);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn failed_runs_are_retried_then_given_up() {
        let store = InMemoryOpsStore::arc();
        for op in [
            StoreOperation::LoadStockLevels,
            StoreOperation::LoadStoreVisits,
            StoreOperation::LoadOutstandingInvoices,
            StoreOperation::LoadReorderItems,
            StoreOperation::LoadAgentActivity,
        ] {
            store.fail_on(op);
        }
        let runner = ScanRunner {
            max_retries: 2,
            base_backoff: Duration::from_millis(1),
            ..ScanRunner::default()
        };
        let handle = runner.spawn("failing-runner", coordinator(&store));

        // One initial attempt plus two retries, then it waits for the hourly tick.
        assert!(eventually(|| handle.attempts() >= 3).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.attempts(), 3);

        handle.shutdown().await;
    }
}
