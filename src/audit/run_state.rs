//! Run throttle: last-run marker file plus the minimum-interval decision.
//!
//! The marker holds a single integer epoch value, written atomically at the
//! successful completion of a deleting run. When the minimum interval has
//! not elapsed and the run is not forced, the caller must obtain explicit
//! confirmation before proceeding — declining is a normal zero-exit return,
//! never an error.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::core::errors::{M2jError, Result};

/// Outcome of the throttle check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Interval elapsed (or no prior run, or forced): run freely.
    Proceed,
    /// Interval not yet elapsed: ask the user before continuing.
    NeedsConfirmation {
        last_run: SystemTime,
        remaining: Duration,
    },
}

/// File-backed throttle for deleting runs.
#[derive(Debug, Clone)]
pub struct RunThrottle {
    marker_path: PathBuf,
    min_interval: Duration,
}

impl RunThrottle {
    #[must_use]
    pub fn new(marker_path: PathBuf, min_interval_days: u64) -> Self {
        Self {
            marker_path,
            min_interval: Duration::from_secs(min_interval_days * 86_400),
        }
    }

    #[must_use]
    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Read the last-run timestamp, if any. A garbled marker reads as
    /// "never ran" rather than blocking the run.
    #[must_use]
    pub fn last_run(&self) -> Option<SystemTime> {
        let raw = fs::read_to_string(&self.marker_path).ok()?;
        let secs: u64 = raw.trim().parse().ok()?;
        Some(UNIX_EPOCH + Duration::from_secs(secs))
    }

    /// Record a successful deleting run at `now`, atomically.
    pub fn record_run(&self, now: SystemTime) -> Result<()> {
        if let Some(parent) = self.marker_path.parent() {
            fs::create_dir_all(parent).map_err(|source| M2jError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let secs = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs();
        let tmp = self.marker_path.with_extension("tmp");
        fs::write(&tmp, format!("{secs}\n")).map_err(|source| M2jError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.marker_path).map_err(|source| M2jError::Io {
            path: self.marker_path.clone(),
            source,
        })
    }

    /// Decide whether a run may proceed without confirmation.
    #[must_use]
    pub fn should_run(&self, now: SystemTime, forced: bool) -> ThrottleDecision {
        if forced {
            return ThrottleDecision::Proceed;
        }
        let Some(last_run) = self.last_run() else {
            return ThrottleDecision::Proceed;
        };
        let Ok(elapsed) = now.duration_since(last_run) else {
            // Clock went backwards; treat as elapsed rather than locking out.
            return ThrottleDecision::Proceed;
        };
        if elapsed >= self.min_interval {
            ThrottleDecision::Proceed
        } else {
            ThrottleDecision::NeedsConfirmation {
                last_run,
                remaining: self.min_interval - elapsed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn throttle(dir: &Path, days: u64) -> RunThrottle {
        RunThrottle::new(dir.join("last-run"), days)
    }

    fn ts(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn no_marker_means_proceed() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        assert!(t.last_run().is_none());
        assert_eq!(t.should_run(ts(1_000_000), false), ThrottleDecision::Proceed);
    }

    #[test]
    fn record_and_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        t.record_run(ts(1_700_000_000)).unwrap();
        assert_eq!(t.last_run(), Some(ts(1_700_000_000)));

        // Marker content is a single integer epoch value.
        let raw = fs::read_to_string(t.marker_path()).unwrap();
        assert_eq!(raw.trim(), "1700000000");
    }

    #[test]
    fn recent_run_needs_confirmation() {
        // Last run 2 days ago, minimum interval 7 days.
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        let last = ts(1_700_000_000);
        t.record_run(last).unwrap();

        let now = last + Duration::from_secs(2 * 86_400);
        match t.should_run(now, false) {
            ThrottleDecision::NeedsConfirmation {
                last_run,
                remaining,
            } => {
                assert_eq!(last_run, last);
                assert_eq!(remaining, Duration::from_secs(5 * 86_400));
            }
            ThrottleDecision::Proceed => panic!("expected confirmation gate"),
        }
    }

    #[test]
    fn elapsed_interval_proceeds() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        let last = ts(1_700_000_000);
        t.record_run(last).unwrap();

        let now = last + Duration::from_secs(8 * 86_400);
        assert_eq!(t.should_run(now, false), ThrottleDecision::Proceed);
    }

    #[test]
    fn forced_bypasses_throttle() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        let last = ts(1_700_000_000);
        t.record_run(last).unwrap();

        let now = last + Duration::from_secs(60);
        assert_eq!(t.should_run(now, true), ThrottleDecision::Proceed);
    }

    #[test]
    fn garbled_marker_reads_as_never_ran() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        fs::write(t.marker_path(), "not-a-number").unwrap();
        assert!(t.last_run().is_none());
        assert_eq!(t.should_run(ts(1_000), false), ThrottleDecision::Proceed);
    }

    #[test]
    fn future_marker_does_not_lock_out() {
        let tmp = TempDir::new().unwrap();
        let t = throttle(tmp.path(), 7);
        t.record_run(ts(2_000_000_000)).unwrap();
        assert_eq!(t.should_run(ts(1_000_000_000), false), ThrottleDecision::Proceed);
    }

    #[test]
    fn record_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let t = RunThrottle::new(tmp.path().join("state/nested/last-run"), 7);
        t.record_run(ts(42)).unwrap();
        assert!(t.marker_path().exists());
    }
}
