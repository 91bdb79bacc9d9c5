//! Activity logger thread: all phases send events through a bounded channel.
//!
//! A dedicated thread owns the `JsonlWriter`; senders use non-blocking
//! `try_send()` so the audit pipeline is never stalled by logging
//! back-pressure.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::Result;
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

/// Events that can be logged through the activity logger.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    AuditStarted {
        version: String,
        repo_roots: usize,
    },
    AuditCompleted {
        used: usize,
        unused: usize,
        protected: usize,
        duration_ms: u64,
    },
    ModuleListed {
        module: String,
        coordinates: usize,
        source: String,
    },
    ListingFallback {
        module: String,
        fallback: String,
        reason: String,
    },
    CacheScanned {
        artifacts: usize,
        skipped_subtrees: usize,
        duration_ms: u64,
    },
    ArtifactPurged {
        coordinate: String,
        path: String,
        size_bytes: u64,
        duration_ms: u64,
    },
    PurgeFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    LockSwept {
        path: String,
    },
    ReportWritten {
        path: String,
        rows: usize,
    },
    Warning {
        code: String,
        message: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

/// Spawn the logger thread and return a handle plus its join handle.
pub fn spawn_logger(
    config: JsonlConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(CHANNEL_CAPACITY);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: dropped,
    };

    let join = thread::Builder::new()
        .name("m2j-logger".to_string())
        .spawn(move || logger_thread_main(&rx, config, &dropped_clone))
        .map_err(|e| crate::core::errors::M2jError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
    }

    jsonl.flush();
    jsonl.fsync();
}

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::AuditStarted {
            version,
            repo_roots,
        } => {
            let mut e = LogEntry::new(EventType::AuditStart, Severity::Info);
            e.details = Some(format!("version={version} repo_roots={repo_roots}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::AuditCompleted {
            used,
            unused,
            protected,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::AuditComplete, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("used={used} unused={unused} protected={protected}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ModuleListed {
            module,
            coordinates,
            source,
        } => {
            let mut e = LogEntry::new(EventType::ModuleListed, Severity::Info);
            e.path = Some(module.clone());
            e.details = Some(format!("coordinates={coordinates} source={source}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ListingFallback {
            module,
            fallback,
            reason,
        } => {
            let mut e = LogEntry::new(EventType::ListingFallback, Severity::Warning);
            e.path = Some(module.clone());
            e.details = Some(format!("fallback={fallback} reason={reason}"));
            e
        }
        ActivityEvent::CacheScanned {
            artifacts,
            skipped_subtrees,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::CacheScanned, Severity::Info);
            e.duration_ms = Some(*duration_ms);
            e.details = Some(format!("artifacts={artifacts} skipped={skipped_subtrees}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ArtifactPurged {
            coordinate,
            path,
            size_bytes,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactPurged, Severity::Info);
            e.coordinate = Some(coordinate.clone());
            e.path = Some(path.clone());
            e.size = Some(*size_bytes);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PurgeFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventType::PurgeFailed, Severity::Warning);
            e.path = Some(path.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::LockSwept { path } => {
            let mut e = LogEntry::new(EventType::LockSwept, Severity::Info);
            e.path = Some(path.clone());
            e.ok = Some(true);
            e
        }
        ActivityEvent::ReportWritten { path, rows } => {
            let mut e = LogEntry::new(EventType::ReportWritten, Severity::Info);
            e.path = Some(path.clone());
            e.details = Some(format!("rows={rows}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::Warning { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Warning);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, Severity::Critical);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => {
            // Handled before conversion; kept for exhaustiveness.
            LogEntry::new(EventType::AuditComplete, Severity::Info)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::jsonl::JsonlConfig;

    fn test_config(dir: &std::path::Path) -> JsonlConfig {
        JsonlConfig {
            path: dir.join("test.jsonl"),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 60,
        }
    }

    #[test]
    fn spawn_and_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        handle.send(ActivityEvent::AuditStarted {
            version: "0.3.1".to_string(),
            repo_roots: 2,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert!(contents.contains("audit_start"));
    }

    #[test]
    fn multiple_events_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();

        handle.send(ActivityEvent::AuditStarted {
            version: "0.3.1".to_string(),
            repo_roots: 1,
        });
        handle.send(ActivityEvent::CacheScanned {
            artifacts: 812,
            skipped_subtrees: 0,
            duration_ms: 340,
        });
        handle.send(ActivityEvent::ArtifactPurged {
            coordinate: "org.foo:bar:1.0".to_string(),
            path: "/home/u/.m2/repository/org/foo/bar/1.0".to_string(),
            size_bytes: 1_234_567,
            duration_ms: 12,
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("org.foo:bar:1.0"));
    }

    #[test]
    fn handles_are_cloneable_and_send() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, join) = spawn_logger(test_config(dir.path())).unwrap();
        let h2 = handle.clone();

        handle.send(ActivityEvent::LockSwept {
            path: "/repo/org/foo/bar/1.0/bar-1.0.jar.lock".to_string(),
        });
        h2.send(ActivityEvent::Warning {
            code: "M2J-4001".to_string(),
            message: "mvn not on PATH".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("test.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn dropped_events_counter_starts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _join) = spawn_logger(test_config(dir.path())).unwrap();
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
    }
}
