//! Purge executor: multi-pass guarded deletion of unused cache artifacts.
//!
//! Pipeline per pass: re-verify candidate still exists -> containment guard
//! -> recursive removal -> prune now-empty ancestors up to (never including)
//! the cache root. The build tool may repopulate or hold directories while we
//! run, so failed deletions are retried in subsequent passes up to
//! `max_attempts`; the remaining-candidate count never grows pass over pass.
//!
//! A directory already absent at delete time is counted `missing`, not
//! deleted and not an error.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::errors::M2jError;
use crate::core::paths::resolve_absolute_path;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::walker::InstalledArtifact;

// ──────────────────── configuration ────────────────────

/// Knobs for one purge run.
#[derive(Debug, Clone)]
pub struct PurgeOptions {
    /// Retry passes over still-existing candidates.
    pub max_attempts: u32,
    /// Count and report without deleting.
    pub dry_run: bool,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            dry_run: false,
        }
    }
}

// ──────────────────── report types ────────────────────

/// Summary after a purge run completes.
#[derive(Debug, Clone, Default)]
pub struct PurgeReport {
    pub deleted: usize,
    pub failed: usize,
    /// Candidates already absent at delete time.
    pub missing: usize,
    pub freed_bytes: u64,
    /// Passes actually executed (1..=max_attempts).
    pub passes: u32,
    pub errors: Vec<PurgeError>,
    pub dry_run: bool,
    pub locks_swept: usize,
}

/// A single deletion failure record.
#[derive(Debug, Clone)]
pub struct PurgeError {
    pub path: PathBuf,
    pub error: String,
    pub recoverable: bool,
}

// ──────────────────── executor ────────────────────

/// Deletes unused candidates from the cache under containment guards.
pub struct PurgeExecutor {
    options: PurgeOptions,
    logger: Option<ActivityLoggerHandle>,
}

impl PurgeExecutor {
    pub fn new(options: PurgeOptions, logger: Option<ActivityLoggerHandle>) -> Self {
        Self { options, logger }
    }

    /// Delete every candidate directory, retrying failures across passes.
    pub fn purge(&self, candidates: &[InstalledArtifact], cache_root: &Path) -> PurgeReport {
        let mut report = PurgeReport {
            dry_run: self.options.dry_run,
            ..PurgeReport::default()
        };

        let root = resolve_absolute_path(cache_root);

        // Containment guard first: a candidate outside the cache root (or
        // normalizing to the root itself) is refused permanently, never
        // retried.
        let mut remaining: Vec<&InstalledArtifact> = Vec::new();
        for candidate in candidates {
            if is_contained(&candidate.dir, &root) {
                remaining.push(candidate);
            } else {
                report.failed += 1;
                report.errors.push(PurgeError {
                    path: candidate.dir.clone(),
                    error: "refused: path not strictly inside cache root".to_string(),
                    recoverable: false,
                });
                self.log_event(ActivityEvent::PurgeFailed {
                    path: candidate.dir.to_string_lossy().to_string(),
                    error_code: "M2J-5001".to_string(),
                    error_message: "path not strictly inside cache root".to_string(),
                });
            }
        }

        for pass in 1..=self.options.max_attempts {
            report.passes = pass;
            let mut next: Vec<&InstalledArtifact> = Vec::new();

            for candidate in remaining {
                // Re-verify: another process may have removed it already.
                if !candidate.dir.exists() {
                    report.missing += 1;
                    continue;
                }

                if self.options.dry_run {
                    report.deleted += 1;
                    report.freed_bytes += candidate.size_bytes;
                    continue;
                }

                let started = Instant::now();
                match fs::remove_dir_all(&candidate.dir) {
                    Ok(()) => {
                        report.deleted += 1;
                        report.freed_bytes += candidate.size_bytes;
                        prune_empty_ancestors(&candidate.dir, &root);

                        #[allow(clippy::cast_possible_truncation)]
                        let duration_ms = started.elapsed().as_millis() as u64;
                        self.log_event(ActivityEvent::ArtifactPurged {
                            coordinate: candidate.coordinate.to_string(),
                            path: candidate.dir.to_string_lossy().to_string(),
                            size_bytes: candidate.size_bytes,
                            duration_ms,
                        });
                    }
                    Err(err) => {
                        let failure = M2jError::DeletionFailed {
                            path: candidate.dir.clone(),
                            details: err.to_string(),
                        };
                        self.log_event(ActivityEvent::PurgeFailed {
                            path: candidate.dir.to_string_lossy().to_string(),
                            error_code: failure.code().to_string(),
                            error_message: failure.to_string(),
                        });
                        next.push(candidate);
                    }
                }
            }

            remaining = next;
            if remaining.is_empty() {
                break;
            }
        }

        // Whatever survives every pass is a hard failure.
        for candidate in remaining {
            report.failed += 1;
            report.errors.push(PurgeError {
                path: candidate.dir.clone(),
                error: format!(
                    "still present after {} passes",
                    report.passes
                ),
                recoverable: true,
            });
        }

        report
    }

    /// Remove stale lock/partial files collected by the scanner.
    ///
    /// Returns the number actually removed; already-gone files are silently
    /// skipped.
    pub fn sweep_stale_locks(&self, locks: &[PathBuf]) -> usize {
        if self.options.dry_run {
            return 0;
        }
        let mut swept = 0;
        for lock in locks {
            match fs::remove_file(lock) {
                Ok(()) => {
                    swept += 1;
                    self.log_event(ActivityEvent::LockSwept {
                        path: lock.to_string_lossy().to_string(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    self.log_event(ActivityEvent::PurgeFailed {
                        path: lock.to_string_lossy().to_string(),
                        error_code: "M2J-5001".to_string(),
                        error_message: err.to_string(),
                    });
                }
            }
        }
        swept
    }

    fn log_event(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}

// ──────────────────── guards ────────────────────

/// A candidate must normalize to a path strictly inside the cache root.
fn is_contained(candidate: &Path, normalized_root: &Path) -> bool {
    let resolved = resolve_absolute_path(candidate);
    resolved != *normalized_root && resolved.starts_with(normalized_root)
}

/// Remove now-empty parent directories from `dir`'s parent up to (not
/// including) the cache root. Stops at the first non-empty ancestor.
fn prune_empty_ancestors(dir: &Path, normalized_root: &Path) {
    let mut current = dir.parent();
    while let Some(parent) = current {
        let resolved = resolve_absolute_path(parent);
        if resolved == *normalized_root || !resolved.starts_with(normalized_root) {
            break;
        }
        // remove_dir fails on non-empty directories, which ends the climb.
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
}

// ──────────────────── tests ────────────────────
