//! JSONL activity log: append-only line-delimited JSON.
//!
//! Each line is a self-contained JSON object, assembled in memory and written
//! with a single `write_all` so tailing processes never see partial lines.
//!
//! Degradation chain:
//! 1. Primary file path
//! 2. stderr with `[M2J-LOG]` prefix
//! 3. Silent discard (an audit run must never fail for logging reasons)

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions, rename};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::core::errors::{M2jError, Result};

/// Severity level for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Log event types matching the m2j activity model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AuditStart,
    AuditComplete,
    ModuleListed,
    ListingFallback,
    CacheScanned,
    ArtifactPurged,
    PurgeFailed,
    LockSwept,
    ReportWritten,
    Error,
}

/// A single JSONL log entry — all fields optional except `ts`, `event`,
/// `severity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO 8601 UTC timestamp.
    pub ts: String,
    /// Event type identifier.
    pub event: EventType,
    /// Severity level.
    pub severity: Severity,
    /// Affected filesystem path (when applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Artifact coordinate as `group:artifact:version`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinate: Option<String>,
    /// Size in bytes of the affected item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Resolution scope involved (listing events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Duration of the action in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Whether the action succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// M2J error code if the action failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable error message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Freeform details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current UTC time.
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: format_utc_now(),
            event,
            severity,
            path: None,
            coordinate: None,
            size: None,
            scope: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Degradation state of the JSONL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    /// Writing to the primary path.
    Normal,
    /// File write failed, writing to stderr.
    Stderr,
    /// Everything failed, silently discarding.
    Discard,
}

/// Configuration for the JSONL writer.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Primary log file path.
    pub path: PathBuf,
    /// Maximum file size before rotation (bytes). Default: 20 MiB.
    pub max_size_bytes: u64,
    /// Number of rotated files to keep. Default: 3.
    pub max_rotated_files: u32,
    /// Seconds between forced fsync calls. Default: 10.
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: crate::core::paths::home_dir()
                .join(".local")
                .join("share")
                .join("m2j")
                .join("activity.jsonl"),
            max_size_bytes: 20 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

/// Append-only JSONL log writer with rotation and degradation.
pub struct JsonlWriter {
    config: JsonlConfig,
    writer: Option<BufWriter<File>>,
    state: WriterState,
    bytes_written: u64,
    last_fsync: SystemTime,
}

impl JsonlWriter {
    /// Open the JSONL log file. Falls through the degradation chain on failure.
    pub fn open(config: JsonlConfig) -> Self {
        let mut w = Self {
            config,
            writer: None,
            state: WriterState::Discard,
            bytes_written: 0,
            last_fsync: SystemTime::now(),
        };
        w.try_open_primary();
        w
    }

    /// Write a single log entry as one atomic JSONL line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                // Serialization failure is a programming error; report and bail.
                let _ = writeln!(io::stderr(), "[M2J-LOG] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    /// Flush buffers.
    pub fn flush(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
    }

    /// Force an fsync on the underlying file.
    pub fn fsync(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
            let _ = w.get_ref().sync_data();
            self.last_fsync = SystemTime::now();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    /// Number of bytes written to the current file.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    // ──────────────────────── internals ────────────────────────

    fn write_line(&mut self, line: &str) {
        if self.state == WriterState::Normal
            && self.bytes_written + line.len() as u64 > self.config.max_size_bytes
        {
            self.rotate();
        }

        match self.state {
            WriterState::Normal => {
                if let Some(w) = self.writer.as_mut() {
                    if w.write_all(line.as_bytes()).is_err() {
                        self.degrade();
                        self.write_line(line); // retry at next level
                        return;
                    }
                    self.bytes_written += line.len() as u64;
                    self.maybe_fsync();
                } else {
                    self.degrade();
                    self.write_line(line);
                }
            }
            WriterState::Stderr => {
                let _ = write!(io::stderr(), "[M2J-LOG] {line}");
            }
            WriterState::Discard => {}
        }
    }

    fn maybe_fsync(&mut self) {
        let elapsed = SystemTime::now()
            .duration_since(self.last_fsync)
            .unwrap_or(Duration::ZERO);
        if elapsed.as_secs() >= self.config.fsync_interval_secs {
            self.fsync();
        }
    }

    fn try_open_primary(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.state = WriterState::Normal;
                self.bytes_written = size;
            }
            Err(_) => {
                self.state = WriterState::Stderr;
                let _ = writeln!(
                    io::stderr(),
                    "[M2J-LOG] cannot open {}, logging to stderr",
                    self.config.path.display()
                );
            }
        }
    }

    fn degrade(&mut self) {
        self.writer = None;
        match self.state {
            WriterState::Normal => {
                self.state = WriterState::Stderr;
                let _ = writeln!(io::stderr(), "[M2J-LOG] log write failed, using stderr");
            }
            WriterState::Stderr => self.state = WriterState::Discard,
            WriterState::Discard => {}
        }
    }

    fn rotate(&mut self) {
        if let Some(w) = self.writer.as_mut() {
            let _ = w.flush();
        }
        self.writer = None;

        let base = self.config.path.clone();

        // Shift existing rotations: .3→delete, .2→.3, .1→.2, current→.1
        for i in (1..self.config.max_rotated_files).rev() {
            let from = rotated_name(&base, i);
            let to = rotated_name(&base, i + 1);
            let _ = rename(&from, &to);
        }
        let oldest = rotated_name(&base, self.config.max_rotated_files);
        let _ = fs::remove_file(&oldest);
        let _ = rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.writer = Some(BufWriter::with_capacity(64 * 1024, file));
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create a file for appending. Returns `(File, current_size)`.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| M2jError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| M2jError::io(path, source))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

/// Build a rotated filename: `activity.jsonl` → `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Format current UTC time as ISO 8601.
fn format_utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// ──────────────────────── tests ────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config(path: PathBuf) -> JsonlConfig {
        JsonlConfig {
            path,
            max_size_bytes: 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 60,
        }
    }

    #[test]
    fn write_entry_produces_valid_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));

        let mut entry = LogEntry::new(EventType::AuditStart, Severity::Info);
        entry.details = Some("repos=2".to_string());
        writer.write_entry(&entry);
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "audit_start");
        assert_eq!(parsed["severity"], "info");
    }

    #[test]
    fn multiple_entries_are_separate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("multi.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));

        for _ in 0..5 {
            writer.write_entry(&LogEntry::new(EventType::CacheScanned, Severity::Info));
        }
        writer.flush();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 5);
        for line in contents.lines() {
            let _: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn rotation_shifts_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rot.jsonl");
        let mut cfg = config(path.clone());
        cfg.max_size_bytes = 100; // tiny: force rotation after ~1 entry
        let mut writer = JsonlWriter::open(cfg);

        for _ in 0..10 {
            writer.write_entry(&LogEntry::new(EventType::CacheScanned, Severity::Info));
        }
        writer.flush();

        assert!(path.exists());
        assert!(rotated_name(&path, 1).exists());
    }

    #[test]
    fn unwritable_primary_degrades_to_stderr() {
        let writer = JsonlWriter::open(config(PathBuf::from(
            "/proc/definitely-unwritable/m2j.jsonl",
        )));
        assert_eq!(writer.state(), "stderr");
    }

    #[test]
    fn state_reports_normal_for_writable_path() {
        let dir = tempfile::tempdir().unwrap();
        let writer = JsonlWriter::open(config(dir.path().join("ok.jsonl")));
        assert_eq!(writer.state(), "normal");
    }

    #[test]
    fn entry_optional_fields_omitted_when_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.jsonl");
        let mut writer = JsonlWriter::open(config(path.clone()));

        writer.write_entry(&LogEntry::new(EventType::AuditStart, Severity::Info));
        writer.flush();

        let line = fs::read_to_string(&path).unwrap();
        assert!(!line.contains("\"path\""));
        assert!(!line.contains("\"coordinate\""));
        assert!(!line.contains("\"size\""));
    }
}
