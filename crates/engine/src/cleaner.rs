//! Expired test cleanup background task
//!
//! [`TestCleaner`] runs in its own thread and periodically evicts tests
//! older than the retention window from the [`TestDirectory`], then asks
//! the data store to drop payloads older than the same cutoff.
//!
//! # Design Notes
//!
//! - Eviction works from a directory snapshot and re-checks pointer
//!   identity before removing, so a test recreated mid-sweep survives
//! - Connections of an evicted test are not touched; their sessions keep
//!   their own reference to the aggregate
//! - Graceful shutdown via atomic flag, polled at least every 100ms

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info};

use testsync_core::{DataStore, TestId};

/// Shortest accepted sweep interval; smaller values are raised to this.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

use crate::directory::TestDirectory;

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Tests removed from the directory
    pub evicted: Vec<TestId>,
    /// Payloads removed from the store
    pub payloads_removed: usize,
}

/// Background eviction task
///
/// # Example
///
/// ```ignore
/// let cleaner = TestCleaner::new(directory, store, interval, retention);
/// let handle = cleaner.start()?;
///
/// // ... serve ...
///
/// cleaner.shutdown();
/// handle.join().unwrap();
/// ```
pub struct TestCleaner {
    directory: Arc<TestDirectory>,
    store: Arc<dyn DataStore>,
    /// How often to sweep
    check_interval: Duration,
    /// Tests older than this are evicted
    retention: Duration,
    shutdown: Arc<AtomicBool>,
}

impl TestCleaner {
    /// Create a cleaner; nothing runs until [`start`](Self::start).
    ///
    /// `check_interval` is raised to [`MIN_CHECK_INTERVAL`] if shorter.
    pub fn new(
        directory: Arc<TestDirectory>,
        store: Arc<dyn DataStore>,
        check_interval: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            directory,
            store,
            check_interval: check_interval.max(MIN_CHECK_INTERVAL),
            retention,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background thread.
    ///
    /// The first sweep happens one interval after start. The thread runs
    /// until [`shutdown`](Self::shutdown) is called.
    pub fn start(&self) -> std::io::Result<JoinHandle<()>> {
        let sweeper = Sweeper {
            directory: Arc::clone(&self.directory),
            store: Arc::clone(&self.store),
            retention: self.retention,
        };
        let shutdown = Arc::clone(&self.shutdown);
        let check_interval = self.check_interval;

        info!(
            target: "testsync::cleaner",
            interval_secs = check_interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "Cleaner started"
        );

        thread::Builder::new()
            .name("testsync-cleaner".to_string())
            .spawn(move || {
                let sleep_interval = Duration::from_millis(100).min(check_interval);
                while !shutdown.load(Ordering::Relaxed) {
                    let mut elapsed = Duration::ZERO;
                    while elapsed < check_interval {
                        if shutdown.load(Ordering::Relaxed) {
                            debug!(target: "testsync::cleaner", "Cleaner stopped");
                            return;
                        }
                        thread::sleep(sleep_interval);
                        elapsed += sleep_interval;
                    }

                    sweeper.sweep(Utc::now());
                }
            })
    }

    /// Run one sweep as of `now`.
    pub fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        Sweeper {
            directory: Arc::clone(&self.directory),
            store: Arc::clone(&self.store),
            retention: self.retention,
        }
        .sweep(now)
    }

    /// Signal shutdown; the thread exits within one poll interval.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Interval between sweeps.
    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Check if shutdown has been signaled
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

struct Sweeper {
    directory: Arc<TestDirectory>,
    store: Arc<dyn DataStore>,
    retention: Duration,
}

impl Sweeper {
    fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let cutoff = cutoff(now, self.retention);
        let evicted = self.directory.evict_created_before(cutoff);

        let payloads_removed = match self.store.delete_older_than(cutoff) {
            Ok(removed) => removed,
            Err(e) => {
                error!(target: "testsync::cleaner", error = %e, "Could not delete expired payloads");
                0
            }
        };

        info!(
            target: "testsync::cleaner",
            evicted = evicted.len(),
            payloads_removed,
            cutoff = %cutoff,
            "Sweep finished"
        );
        SweepReport {
            evicted,
            payloads_removed,
        }
    }
}

/// `now - retention`, saturating at the earliest representable time.
fn cutoff(now: DateTime<Utc>, retention: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(retention)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
