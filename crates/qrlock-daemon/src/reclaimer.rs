//! Background reclaimer
//!
//! Periodically sweeps the store for the lifetime of the process. A sweep
//! runs on the blocking pool because it touches the filesystem; a sweep that
//! fails or panics is logged and the loop carries on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::store::{EphemeralStore, SweepReport};

/// Default sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Something that can be swept
pub trait Sweep: Send + Sync + 'static {
    fn sweep(&self) -> SweepReport;
}

impl Sweep for EphemeralStore {
    fn sweep(&self) -> SweepReport {
        EphemeralStore::sweep(self)
    }
}

pub struct Reclaimer {
    target: Arc<dyn Sweep>,
    interval: Duration,
}

/// Handle to a running reclaimer
pub struct ReclaimerHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<u64>,
}

impl ReclaimerHandle {
    /// Stop the loop and wait for it; returns the number of sweeps attempted
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(());
        match self.task.await {
            Ok(sweeps) => sweeps,
            Err(e) => {
                error!("Reclaimer task failed: {}", e);
                0
            }
        }
    }
}

impl Reclaimer {
    pub fn new(target: Arc<dyn Sweep>, interval: Duration) -> Self {
        Self { target, interval }
    }

    /// Start the loop on the current runtime
    pub fn spawn(self) -> ReclaimerHandle {
        let (shutdown, rx) = oneshot::channel();
        let task = tokio::spawn(self.run(rx));
        ReclaimerHandle { shutdown, task }
    }

    /// Sweep every `interval` until `shutdown` fires or its sender drops.
    ///
    /// The first sweep happens one full interval after start.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> u64 {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!("Reclaimer started (every {}s)", self.interval.as_secs());
        let mut sweeps = 0u64;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    sweeps += 1;
                    self.sweep_once().await;
                }
            }
        }

        info!("Reclaimer stopped after {} sweep(s)", sweeps);
        sweeps
    }

    async fn sweep_once(&self) {
        let target = Arc::clone(&self.target);
        match tokio::task::spawn_blocking(move || target.sweep()).await {
            Ok(report) if report.is_empty() => debug!("Sweep found nothing to reclaim"),
            Ok(report) => info!(
                "Sweep evicted {} record(s), dropped {} identity(ies), deleted {} path(s) ({} missing, {} failed)",
                report.records_evicted,
                report.identities_dropped,
                report.paths_deleted,
                report.paths_missing,
                report.paths_failed
            ),
            Err(e) => error!("Sweep failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Panics on its first sweep, then counts
    struct Flaky {
        calls: AtomicUsize,
    }

    impl Sweep for Flaky {
        fn sweep(&self) -> SweepReport {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first sweep fails");
            }
            SweepReport::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaimer_survives_panicking_sweep() {
        let flaky = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let handle = Reclaimer::new(flaky.clone(), Duration::from_secs(60)).spawn();

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(61)).await;
        }
        let sweeps = handle.stop().await;

        assert!(sweeps >= 2, "only {} sweeps", sweeps);
        assert!(flaky.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaimer_no_sweep_before_first_interval() {
        let flaky = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
        });
        let handle = Reclaimer::new(flaky.clone(), Duration::from_secs(60)).spawn();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.stop().await, 0);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaimer_deletes_expired_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("qr_deadbeef.png");
        std::fs::write(&artifact, b"png").unwrap();

        let clock = Arc::new(ManualClock::starting_now());
        let store = Arc::new(EphemeralStore::new(clock.clone()));
        store.schedule_deletion(&artifact, chrono::Duration::minutes(5));

        let handle = Reclaimer::new(store.clone(), Duration::from_secs(60)).spawn();

        clock.advance(chrono::Duration::minutes(6));
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_secs(61)).await;
            if !artifact.exists() {
                break;
            }
        }
        handle.stop().await;

        assert!(!artifact.exists());
        assert_eq!(store.stats().temp_files_scheduled, 0);
    }
}
