use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, instrument};

/// Configuration for the cleanup task
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How often to run the cleanup task
    pub cleanup_interval: Duration,
    /// How long a room must be idle before its stats are dropped
    pub inactivity_threshold: Duration,
}

impl CleanupConfig {
    /// Uses the same number of seconds for the period and the idle threshold.
    /// Returns `None` when cleanup is disabled (`seconds <= 0`).
    pub fn from_secs(seconds: i64) -> Option<Self> {
        let seconds = u64::try_from(seconds).ok().filter(|s| *s > 0)?;
        Some(Self {
            cleanup_interval: Duration::from_secs(seconds),
            inactivity_threshold: Duration::from_secs(seconds),
        })
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60 * 60),
            inactivity_threshold: Duration::from_secs(60 * 60),
        }
    }
}

/// Something that can drop the stats of idle, empty rooms
pub trait RoomSweeper: Send + Sync {
    /// Returns the names of the rooms that were removed
    fn sweep_idle_rooms(&self, inactivity_threshold: Duration) -> Vec<String>;
}

/// Handle to the running cleanup task
pub struct CleanupTaskHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl CleanupTaskHandle {
    /// Stops the timer and waits for the task to exit
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.join.await;
        info!("Room cleanup task stopped");
    }
}

/// Starts the background task that periodically sweeps idle rooms.
///
/// The first sweep happens one full interval after start.
#[instrument(skip(sweeper))]
pub fn start_cleanup_task(sweeper: Arc<dyn RoomSweeper>, config: CleanupConfig) -> CleanupTaskHandle {
    info!(
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        inactivity_threshold_secs = config.inactivity_threshold.as_secs(),
        "Starting room cleanup background task"
    );

    let (stop_tx, mut stop_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        let mut ticker = interval_at(
            Instant::now() + config.cleanup_interval,
            config.cleanup_interval,
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sweeper.sweep_idle_rooms(config.inactivity_threshold);
                    if removed.is_empty() {
                        debug!("Room cleanup found nothing to remove");
                    } else {
                        info!(removed_count = removed.len(), "Room cleanup completed");
                    }
                }
                _ = &mut stop_rx => break,
            }
        }
    });

    CleanupTaskHandle { stop_tx, join }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSweeper {
        runs: AtomicUsize,
    }

    impl RoomSweeper for CountingSweeper {
        fn sweep_idle_rooms(&self, _inactivity_threshold: Duration) -> Vec<String> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            vec!["stale".to_string()]
        }
    }

    #[rstest]
    #[case(0, false)]
    #[case(-5, false)]
    #[case(3600, true)]
    fn test_config_from_secs(#[case] seconds: i64, #[case] enabled: bool) {
        let config = CleanupConfig::from_secs(seconds);
        assert_eq!(config.is_some(), enabled);
        if let Some(config) = config {
            assert_eq!(config.cleanup_interval, Duration::from_secs(3600));
            assert_eq!(config.inactivity_threshold, Duration::from_secs(3600));
        }
    }

    #[tokio::test]
    async fn test_task_sweeps_periodically_until_stopped() {
        let sweeper = Arc::new(CountingSweeper::default());
        let config = CleanupConfig {
            cleanup_interval: Duration::from_millis(20),
            inactivity_threshold: Duration::from_secs(1),
        };

        let handle = start_cleanup_task(sweeper.clone(), config);
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.stop().await;

        let runs = sweeper.runs.load(Ordering::SeqCst);
        assert!(runs >= 2, "expected at least two sweeps, got {}", runs);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sweeper.runs.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn test_first_sweep_waits_one_interval() {
        let sweeper = Arc::new(CountingSweeper::default());
        let config = CleanupConfig {
            cleanup_interval: Duration::from_secs(60),
            inactivity_threshold: Duration::from_secs(60),
        };

        let handle = start_cleanup_task(sweeper.clone(), config);
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        assert_eq!(sweeper.runs.load(Ordering::SeqCst), 0);
    }
}
