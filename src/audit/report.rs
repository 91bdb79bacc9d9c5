//! Timestamped CSV report store.
//!
//! Two reports per audit run: the used set and the unused set, both
//! `Dependency,Version` CSVs with rows `group:artifact,version`. Files are
//! written atomically (tmp + rename) so a crash never leaves a half-report
//! that a later run would trust. A sufficiently fresh used-report may be
//! reloaded as the use-set, skipping the collection phase entirely.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::core::errors::{M2jError, Result};
use crate::scanner::codec::ArtifactCoordinate;
use crate::scanner::walker::InstalledArtifact;

/// CSV header shared by both report variants.
pub const CSV_HEADER: &str = "Dependency,Version";

const USED_PREFIX: &str = "used-deps-";
const UNUSED_PREFIX: &str = "unused-deps-";

/// Paths of the reports written by one run.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub used_path: PathBuf,
    pub unused_path: PathBuf,
}

/// File-backed report store rooted at the configured output directory.
#[derive(Debug, Clone)]
pub struct ReportStore {
    output_dir: PathBuf,
}

impl ReportStore {
    #[must_use]
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write both reports, timestamped with `now`.
    pub fn write_reports(
        &self,
        used: &[ArtifactCoordinate],
        unused: &[InstalledArtifact],
        now: DateTime<Utc>,
    ) -> Result<WrittenReports> {
        fs::create_dir_all(&self.output_dir).map_err(|source| M2jError::Io {
            path: self.output_dir.clone(),
            source,
        })?;

        let stamp = now.format("%Y%m%d-%H%M%S");
        let used_path = self.output_dir.join(format!("{USED_PREFIX}{stamp}.csv"));
        let unused_path = self.output_dir.join(format!("{UNUSED_PREFIX}{stamp}.csv"));

        write_atomic(&used_path, &render_used_csv(used))?;
        write_atomic(&unused_path, &render_unused_csv(unused))?;

        Ok(WrittenReports {
            used_path,
            unused_path,
        })
    }

    /// Newest used-report in the output directory, by timestamped filename.
    #[must_use]
    pub fn latest_used_report(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.output_dir).ok()?;
        entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("csv")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(USED_PREFIX))
            })
            .max()
    }

    /// Reload a used-report as a use-set. Malformed rows are skipped.
    pub fn load_use_set(path: &Path) -> Result<Vec<ArtifactCoordinate>> {
        let raw = fs::read_to_string(path).map_err(|source| M2jError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut out = Vec::new();
        for line in raw.lines().skip(1) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((dependency, version)) = line.rsplit_once(',') else {
                continue;
            };
            let Some((group, artifact)) = dependency.split_once(':') else {
                continue;
            };
            if let Ok(coordinate) = ArtifactCoordinate::new(group, artifact, version.trim()) {
                out.push(coordinate);
            }
        }
        Ok(out)
    }
}

/// Render the used report. Caller supplies rows already sorted and
/// deduplicated; rendering adds nothing, so identical inputs yield
/// byte-identical reports.
#[must_use]
pub fn render_used_csv(used: &[ArtifactCoordinate]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for coordinate in used {
        out.push_str(&format!(
            "{}:{},{}\n",
            coordinate.group, coordinate.artifact, coordinate.version
        ));
    }
    out
}

/// Render the unused report (same row shape as the used report).
#[must_use]
pub fn render_unused_csv(unused: &[InstalledArtifact]) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for artifact in unused {
        let c = &artifact.coordinate;
        out.push_str(&format!("{}:{},{}\n", c.group, c.artifact, c.version));
    }
    out
}

/// Whether a report file is young enough to reuse, by file mtime.
#[must_use]
pub fn is_report_fresh(path: &Path, now: SystemTime, max_age_days: u64) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = meta.modified() else {
        return false;
    };
    let max_age = Duration::from_secs(max_age_days * 86_400);
    now.duration_since(modified)
        .map_or(true, |age| age <= max_age)
}

/// Store file contents using atomic rename for crash safety.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, contents).map_err(|source| M2jError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| M2jError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn coord(g: &str, a: &str, v: &str) -> ArtifactCoordinate {
        ArtifactCoordinate::new(g, a, v).unwrap()
    }

    fn installed(g: &str, a: &str, v: &str) -> InstalledArtifact {
        InstalledArtifact {
            coordinate: coord(g, a, v),
            dir: PathBuf::from("/repo"),
            size_bytes: 0,
            last_modified: SystemTime::UNIX_EPOCH,
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn write_reports_produces_csv_pair() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().to_path_buf());

        let used = vec![coord("org.foo", "bar", "1.0")];
        let unused = vec![installed("org.baz", "qux", "2.0")];
        let written = store.write_reports(&used, &unused, ts(1_700_000_000)).unwrap();

        let used_contents = fs::read_to_string(&written.used_path).unwrap();
        assert_eq!(used_contents, "Dependency,Version\norg.foo:bar,1.0\n");

        let unused_contents = fs::read_to_string(&written.unused_path).unwrap();
        assert!(unused_contents.contains("org.baz:qux,2.0"));
    }

    #[test]
    fn reports_are_timestamped_and_latest_wins() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().to_path_buf());

        store.write_reports(&[], &[], ts(1_700_000_000)).unwrap();
        let second = store.write_reports(&[], &[], ts(1_700_090_000)).unwrap();

        assert_eq!(store.latest_used_report(), Some(second.used_path));
    }

    #[test]
    fn latest_ignores_unused_reports_and_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().to_path_buf());
        let written = store.write_reports(&[], &[], ts(1_700_000_000)).unwrap();
        fs::write(tmp.path().join("zzz-not-a-report.csv"), "x").unwrap();
        fs::write(tmp.path().join("zzz.txt"), "x").unwrap();

        assert_eq!(store.latest_used_report(), Some(written.used_path));
    }

    #[test]
    fn empty_output_dir_has_no_latest() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().join("never-created"));
        assert!(store.latest_used_report().is_none());
    }

    #[test]
    fn load_use_set_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = ReportStore::new(tmp.path().to_path_buf());
        let used = vec![
            coord("org.apache.commons", "commons-lang3", "3.12.0"),
            coord("junit", "junit", "4.13.2"),
        ];
        let written = store.write_reports(&used, &[], ts(1_700_000_000)).unwrap();

        let loaded = ReportStore::load_use_set(&written.used_path).unwrap();
        assert_eq!(loaded, used);
    }

    #[test]
    fn load_use_set_skips_malformed_rows() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("used-deps-x.csv");
        fs::write(
            &path,
            "Dependency,Version\nnot-a-row\norg.foo:bar,1.0\nmissing-colon,2.0\n",
        )
        .unwrap();

        let loaded = ReportStore::load_use_set(&path).unwrap();
        assert_eq!(loaded, vec![coord("org.foo", "bar", "1.0")]);
    }

    #[test]
    fn freshness_follows_file_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("used-deps-x.csv");
        fs::write(&path, CSV_HEADER).unwrap();

        let now = SystemTime::now();
        assert!(is_report_fresh(&path, now, 7));

        // Age the file ten days; a seven-day limit rejects it.
        let ten_days_ago = filetime::FileTime::from_system_time(
            now - Duration::from_secs(10 * 86_400),
        );
        filetime::set_file_mtime(&path, ten_days_ago).unwrap();
        assert!(!is_report_fresh(&path, now, 7));
        assert!(is_report_fresh(&path, now, 30));
    }

    #[test]
    fn missing_report_is_never_fresh() {
        assert!(!is_report_fresh(
            Path::new("/no/such/report.csv"),
            SystemTime::now(),
            7
        ));
    }

    #[test]
    fn render_is_deterministic() {
        let used = vec![coord("a.b", "c", "1.0"), coord("d.e", "f", "2.0")];
        assert_eq!(render_used_csv(&used), render_used_csv(&used));
    }
}
