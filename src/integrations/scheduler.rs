//! Periodic revalidation on a Tokio runtime.
//!
//! The check itself is blocking (it performs synchronous HTTP), so each run
//! is moved onto the blocking pool; the timer task only waits.

use crate::TollgateError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Default cadence for license revalidation.
pub const HOURLY: Duration = Duration::from_secs(60 * 60);

/// A no-argument check that never fails; errors are handled inside.
pub trait PeriodicCheck: Send + Sync + 'static {
    /// Run one check.
    fn run_check(&self);
}

/// Handle to a running schedule. Dropping it also stops the schedule.
pub struct ScheduleHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    /// Stop the schedule and wait for an in-flight check to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "license schedule task failed");
        }
    }

    /// Whether the timer task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `check` now and then every `period` on the current Tokio runtime.
///
/// # Errors
/// `ConfigError` if `period` is zero or no runtime is active.
pub fn spawn_every<C>(check: Arc<C>, period: Duration) -> Result<ScheduleHandle, TollgateError>
where
    C: PeriodicCheck + ?Sized,
{
    if period.is_zero() {
        return Err(TollgateError::ConfigError(
            "schedule period must be non-zero".to_string(),
        ));
    }
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TollgateError::ConfigError(format!("No Tokio runtime: {}", e)))?;

    let (shutdown, mut stop) = watch::channel(false);
    let task = runtime.spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = stop.changed() => break,
            }

            let check = check.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || check.run_check()).await {
                error!(error = %e, "scheduled license check panicked");
            }
        }
        debug!("license schedule stopped");
    });

    Ok(ScheduleHandle { shutdown, task })
}

/// [`spawn_every`] with the hourly cadence.
pub fn spawn_hourly<C>(check: Arc<C>) -> Result<ScheduleHandle, TollgateError>
where
    C: PeriodicCheck + ?Sized,
{
    spawn_every(check, HOURLY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        runs: AtomicUsize,
    }

    impl PeriodicCheck for Counter {
        fn run_check(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_repeatedly_until_shutdown() {
        let counter = Arc::new(Counter::default());
        let handle = spawn_every(counter.clone(), Duration::from_millis(10)).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.shutdown().await;

        let runs = counter.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected at least two runs, got {}", runs);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_run_is_immediate() {
        let counter = Arc::new(Counter::default());
        let handle = spawn_hourly(counter.clone()).unwrap();

        for _ in 0..50 {
            if counter.runs.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(counter.runs.load(Ordering::SeqCst), 1);
        handle.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_trait_object_schedule() {
        let counter = Arc::new(Counter::default());
        let check: Arc<dyn PeriodicCheck> = counter.clone();
        let handle = spawn_every(check, Duration::from_millis(5)).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.shutdown().await;
        assert!(counter.runs.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let result = spawn_every(Arc::new(Counter::default()), Duration::ZERO);
        assert!(matches!(result, Err(TollgateError::ConfigError(_))));
    }

    #[test]
    fn test_requires_runtime() {
        let result = spawn_hourly(Arc::new(Counter::default()));
        assert!(matches!(result, Err(TollgateError::ConfigError(_))));
    }
}
