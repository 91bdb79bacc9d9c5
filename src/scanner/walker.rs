//! Cache scanner: walks the local artifact cache and extracts the installed
//! artifact set.
//!
//! The walk is a sequential queue traversal (one process, one pass — the
//! cache is shared with the build tool, so we keep our footprint small and
//! predictable). Individual unreadable subtrees are skipped and counted,
//! never fatal. Interrupted-download litter (`.lock`/`.part` files past a
//! configured age) is collected for the purge executor's lock sweep.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::core::errors::{M2jError, Result};
use crate::scanner::codec::{self, ArtifactCoordinate};

/// Scanner configuration derived from `CacheConfig`/`PurgeConfig`.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub cache_root: PathBuf,
    /// Minimum age before a `.lock`/`.part` file counts as stale.
    pub stale_lock_age: Duration,
}

/// An artifact found installed in the cache: coordinate plus on-disk location
/// and aggregate size.
///
/// The entry persists as filesystem state owned by the build tool's cache;
/// m2j only observes it here and, when authorized, deletes it in the purge
/// executor.
#[derive(Debug, Clone)]
pub struct InstalledArtifact {
    pub coordinate: ArtifactCoordinate,
    /// The version directory holding the artifact's files.
    pub dir: PathBuf,
    /// Total size of all files in the version directory (what deleting frees).
    pub size_bytes: u64,
    /// Newest file modification time within the version directory.
    pub last_modified: SystemTime,
}

/// Result of one full cache walk.
#[derive(Debug, Clone, Default)]
pub struct CacheScan {
    pub artifacts: Vec<InstalledArtifact>,
    /// Subtrees skipped due to permission or read errors.
    pub skipped_subtrees: usize,
    /// Stale lock/partial files eligible for sweeping.
    pub stale_locks: Vec<PathBuf>,
}

/// Sequential walker over the artifact cache.
pub struct CacheScanner {
    config: ScanConfig,
}

impl CacheScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Walk the cache and return the deduplicated installed-artifact set.
    ///
    /// Fails only when the cache root itself is missing; everything below it
    /// degrades to skip-and-continue.
    pub fn scan(&self) -> Result<CacheScan> {
        let root = &self.config.cache_root;
        if !root.is_dir() {
            return Err(M2jError::CacheRootMissing { path: root.clone() });
        }

        let now = SystemTime::now();
        let mut scan = CacheScan::default();
        let mut by_coordinate: HashMap<ArtifactCoordinate, InstalledArtifact> = HashMap::new();
        let mut queue: Vec<PathBuf> = vec![root.clone()];

        while let Some(dir) = queue.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                    scan.skipped_subtrees += 1;
                    continue;
                }
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(_) => {
                    scan.skipped_subtrees += 1;
                    continue;
                }
            };

            // Per-directory accumulation: total file size, newest mtime, and
            // the first file that decodes to a primary archive.
            let mut dir_size: u64 = 0;
            let mut newest: Option<SystemTime> = None;
            let mut dir_coordinate: Option<ArtifactCoordinate> = None;

            for entry_result in entries {
                let Ok(entry) = entry_result else {
                    scan.skipped_subtrees += 1;
                    continue;
                };
                let Ok(ft) = entry.file_type() else {
                    continue;
                };
                let child = entry.path();

                if ft.is_dir() {
                    queue.push(child);
                    continue;
                }
                if !ft.is_file() {
                    continue; // Symlinks are not followed inside the cache.
                }

                let Ok(meta) = entry.metadata() else {
                    continue;
                };
                dir_size = dir_size.saturating_add(meta.len());
                if let Ok(modified) = meta.modified() {
                    newest = Some(newest.map_or(modified, |n: SystemTime| n.max(modified)));
                }

                let Some(name) = child.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };

                if is_stale_lock(name, &meta, now, self.config.stale_lock_age) {
                    scan.stale_locks.push(child.clone());
                    continue;
                }

                if dir_coordinate.is_none()
                    && let Ok(coordinate) = codec::decode(&child, root)
                    && codec::is_primary_archive(name, &coordinate)
                {
                    dir_coordinate = Some(coordinate);
                }
            }

            if let Some(coordinate) = dir_coordinate {
                let artifact = InstalledArtifact {
                    coordinate: coordinate.clone(),
                    dir: dir.clone(),
                    size_bytes: dir_size,
                    last_modified: newest.unwrap_or(SystemTime::UNIX_EPOCH),
                };
                by_coordinate.entry(coordinate).or_insert(artifact);
            }
        }

        scan.artifacts = by_coordinate.into_values().collect();
        Ok(scan)
    }
}

/// Coordinates of artifacts whose newest file mtime is at or after `since`.
///
/// Invoking the build tool may itself download missing artifacts into the
/// shared cache mid-run; this before/after delta treats them as an
/// authoritative usage signal. Best-effort under concurrent builds — an
/// unrelated build touching the cache inflates the set, never shrinks it.
#[must_use]
pub fn downloaded_since(
    artifacts: &[InstalledArtifact],
    since: SystemTime,
) -> HashSet<ArtifactCoordinate> {
    artifacts
        .iter()
        .filter(|a| a.last_modified >= since)
        .map(|a| a.coordinate.clone())
        .collect()
}

fn is_stale_lock(name: &str, meta: &fs::Metadata, now: SystemTime, min_age: Duration) -> bool {
    let is_lock = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext == "lock" || ext == "part");
    if !is_lock {
        return false;
    }
    meta.modified().is_ok_and(|modified| {
        now.duration_since(modified)
            .is_ok_and(|age| age >= min_age)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path) -> ScanConfig {
        ScanConfig {
            cache_root: root.to_path_buf(),
            stale_lock_age: Duration::from_secs(3600),
        }
    }

    /// Lay down a fake installed artifact with primary jar + pom + checksum.
    fn install(root: &Path, group: &str, artifact: &str, version: &str) -> PathBuf {
        let mut dir = root.to_path_buf();
        for seg in group.split('.') {
            dir.push(seg);
        }
        dir.push(artifact);
        dir.push(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{artifact}-{version}.jar")), b"jar bytes").unwrap();
        fs::write(dir.join(format!("{artifact}-{version}.pom")), b"<project/>").unwrap();
        fs::write(dir.join(format!("{artifact}-{version}.jar.sha1")), b"abc").unwrap();
        fs::write(dir.join("_remote.repositories"), b"").unwrap();
        dir
    }

    #[test]
    fn scan_finds_installed_artifacts() {
        let tmp = TempDir::new().unwrap();
        install(tmp.path(), "org.apache.commons", "commons-lang3", "3.12.0");
        install(tmp.path(), "junit", "junit", "4.13.2");

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        let mut found: Vec<String> = scan.artifacts.iter().map(|a| a.coordinate.to_string()).collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                "junit:junit:4.13.2".to_string(),
                "org.apache.commons:commons-lang3:3.12.0".to_string(),
            ]
        );
    }

    #[test]
    fn scan_aggregates_version_dir_size() {
        let tmp = TempDir::new().unwrap();
        let dir = install(tmp.path(), "org.foo", "bar", "1.0");
        let expected: u64 = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().metadata().unwrap().len())
            .sum();

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert_eq!(scan.artifacts.len(), 1);
        assert_eq!(scan.artifacts[0].size_bytes, expected);
        assert_eq!(scan.artifacts[0].dir, dir);
    }

    #[test]
    fn classifier_only_directories_are_not_installed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("org/foo/bar/2.0");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("bar-2.0-sources.jar"), b"src").unwrap();
        fs::write(dir.join("bar-2.0-javadoc.jar"), b"doc").unwrap();

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert!(scan.artifacts.is_empty());
    }

    #[test]
    fn metadata_only_directories_are_not_installed() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("org/foo/bar");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("maven-metadata-local.xml"), b"<metadata/>").unwrap();

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert!(scan.artifacts.is_empty());
    }

    #[test]
    fn multiple_versions_are_distinct_artifacts() {
        let tmp = TempDir::new().unwrap();
        install(tmp.path(), "org.foo", "bar", "1.0");
        install(tmp.path(), "org.foo", "bar", "2.0");

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert_eq!(scan.artifacts.len(), 2);
    }

    #[test]
    fn missing_root_is_cache_root_missing() {
        let err = CacheScanner::new(config(Path::new("/no/such/cache/root")))
            .scan()
            .unwrap_err();
        assert_eq!(err.code(), "M2J-2001");
    }

    #[test]
    fn stale_locks_collected_by_age() {
        let tmp = TempDir::new().unwrap();
        let dir = install(tmp.path(), "org.foo", "bar", "1.0");
        let old_lock = dir.join("bar-1.0.jar.lock");
        let fresh_part = dir.join("bar-1.0.jar.part");
        fs::write(&old_lock, b"").unwrap();
        fs::write(&fresh_part, b"").unwrap();

        // Age the lock two hours into the past; the .part stays fresh.
        let two_hours_ago = filetime::FileTime::from_system_time(
            SystemTime::now() - Duration::from_secs(7200),
        );
        filetime::set_file_mtime(&old_lock, two_hours_ago).unwrap();

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert_eq!(scan.stale_locks, vec![old_lock]);
    }

    #[test]
    fn downloaded_since_uses_newest_mtime() {
        let tmp = TempDir::new().unwrap();
        let old_dir = install(tmp.path(), "org.foo", "old", "1.0");
        install(tmp.path(), "org.foo", "fresh", "1.0");

        // Push the old artifact's files a day into the past.
        let yesterday =
            filetime::FileTime::from_system_time(SystemTime::now() - Duration::from_secs(86_400));
        for entry in fs::read_dir(&old_dir).unwrap() {
            filetime::set_file_mtime(entry.unwrap().path(), yesterday).unwrap();
        }

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        let cutoff = SystemTime::now() - Duration::from_secs(600);
        let downloaded = downloaded_since(&scan.artifacts, cutoff);

        assert_eq!(downloaded.len(), 1);
        assert!(downloaded.iter().any(|c| c.artifact == "fresh"));
    }

    #[test]
    fn snapshot_versions_appear_in_installed_set() {
        // Mutable versions stay in the installed set (they are valid for
        // use-set intersection); the reconciler excludes them from deletion.
        let tmp = TempDir::new().unwrap();
        install(tmp.path(), "org.foo", "bar", "1.0-SNAPSHOT");

        let scan = CacheScanner::new(config(tmp.path())).scan().unwrap();
        assert_eq!(scan.artifacts.len(), 1);
        assert_eq!(scan.artifacts[0].coordinate.version, "1.0-SNAPSHOT");
    }
}
