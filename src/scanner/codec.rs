//! Artifact-path codec: maps cache paths to (group, artifact, version)
//! coordinates and back.
//!
//! The cache lays artifacts out as `<root>/<group-as-dirs>/<artifact>/<version>/
//! <files>`. Decoding works backwards from a file path: version is the
//! second-to-last segment, artifact the third-to-last, and everything before
//! that joins with `.` into the group. Metadata sidecars (repository metadata,
//! checksums, lock/temp files) are never artifacts.

#![allow(missing_docs)]

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::errors::{M2jError, Result};

/// Filenames that mark repository bookkeeping, not artifact content.
const METADATA_FILENAMES: &[&str] = &[
    "maven-metadata.xml",
    "maven-metadata-local.xml",
    "_remote.repositories",
    "resolver-status.properties",
];

/// Extensions of sidecar files that ride along with artifacts.
const SIDECAR_EXTENSIONS: &[&str] = &["sha1", "md5", "sha256", "sha512", "lastUpdated", "part", "lock"];

/// Extensions that count as primary binary artifacts for scanning.
const ARCHIVE_EXTENSIONS: &[&str] = &["jar", "war", "ear", "aar", "zip"];

/// Classifier suffixes excluded from the installed-artifact set.
const EXCLUDED_CLASSIFIERS: &[&str] = &["sources", "javadoc", "tests", "test-sources"];

/// A (group, artifact, version) triple uniquely identifying a dependency or
/// plugin.
///
/// Each field matches `[A-Za-z0-9_.-]+`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ArtifactCoordinate {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl ArtifactCoordinate {
    /// Build a coordinate, validating each field's character set.
    pub fn new(group: &str, artifact: &str, version: &str) -> Result<Self> {
        for (name, value) in [("group", group), ("artifact", artifact), ("version", version)] {
            if !segment_re().is_match(value) {
                return Err(M2jError::Runtime {
                    details: format!("invalid coordinate {name} {value:?}"),
                });
            }
        }
        Ok(Self {
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
        })
    }

    /// The (group, artifact) pair shared by all versions of a dependency.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.group.clone(), self.artifact.clone())
    }

    /// Whether the artifact name follows the build-plugin naming convention.
    #[must_use]
    pub fn has_plugin_naming(&self) -> bool {
        self.artifact.ends_with("-maven-plugin") || self.artifact.ends_with("-plugin")
    }
}

impl fmt::Display for ArtifactCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)
    }
}

impl FromStr for ArtifactCoordinate {
    type Err = M2jError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(M2jError::Runtime {
                details: format!("coordinate {s:?} must have exactly 3 `:`-separated fields"),
            });
        }
        Self::new(parts[0], parts[1], parts[2])
    }
}

fn segment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid regex"))
}

/// Decode a file path inside the cache into a coordinate.
///
/// Requires at least four relative segments (group dirs + artifact + version
/// + filename). Metadata sidecars and malformed depths fail with
/// `NotAnArtifact`.
pub fn decode(path: &Path, cache_root: &Path) -> Result<ArtifactCoordinate> {
    let rel = path
        .strip_prefix(cache_root)
        .map_err(|_| M2jError::NotAnArtifact {
            path: path.to_path_buf(),
            reason: "outside cache root",
        })?;

    let mut segments: Vec<&str> = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(os) => match os.to_str() {
                Some(s) => segments.push(s),
                None => {
                    return Err(M2jError::NotAnArtifact {
                        path: path.to_path_buf(),
                        reason: "non-utf8 path segment",
                    });
                }
            },
            _ => {
                return Err(M2jError::NotAnArtifact {
                    path: path.to_path_buf(),
                    reason: "non-normal path component",
                });
            }
        }
    }

    if segments.len() < 4 {
        return Err(M2jError::NotAnArtifact {
            path: path.to_path_buf(),
            reason: "fewer than 4 path segments",
        });
    }

    let file_name = segments[segments.len() - 1];
    if is_metadata_sidecar(file_name) {
        return Err(M2jError::NotAnArtifact {
            path: path.to_path_buf(),
            reason: "metadata sidecar file",
        });
    }

    let version = segments[segments.len() - 2];
    if version.contains("maven-metadata") {
        return Err(M2jError::NotAnArtifact {
            path: path.to_path_buf(),
            reason: "metadata marker in version segment",
        });
    }
    let artifact = segments[segments.len() - 3];
    let group = segments[..segments.len() - 3].join(".");

    ArtifactCoordinate::new(&group, artifact, version).map_err(|_| M2jError::NotAnArtifact {
        path: path.to_path_buf(),
        reason: "invalid coordinate characters",
    })
}

/// Inverse mapping: coordinate to its version directory under the cache root.
#[must_use]
pub fn encode(coordinate: &ArtifactCoordinate, cache_root: &Path) -> PathBuf {
    let mut path = cache_root.to_path_buf();
    for segment in coordinate.group.split('.') {
        path.push(segment);
    }
    path.push(&coordinate.artifact);
    path.push(&coordinate.version);
    path
}

/// Whether a filename is repository bookkeeping rather than artifact content.
#[must_use]
pub fn is_metadata_sidecar(file_name: &str) -> bool {
    if METADATA_FILENAMES.contains(&file_name) {
        return true;
    }
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SIDECAR_EXTENSIONS.contains(&ext))
}

/// Whether a version string is safe to consider for deletion.
///
/// Snapshot markers, bracket/parenthesis range syntax, and unresolved
/// placeholders represent mutable or unresolved versions; they stay valid for
/// use-set membership but are never deletion candidates.
#[must_use]
pub fn is_deletable_version(version: &str) -> bool {
    if version.to_ascii_uppercase().contains("SNAPSHOT") {
        return false;
    }
    if version.starts_with('[') || version.starts_with('(') {
        return false;
    }
    if version.contains("${") {
        return false;
    }
    segment_re().is_match(version)
}

/// Whether a coordinate field value is well-formed (used by the listing
/// normalizers before constructing coordinates).
#[must_use]
pub fn is_valid_segment(value: &str) -> bool {
    segment_re().is_match(value)
}

/// Classify an archive file within a decoded version directory.
///
/// Returns `true` only for the primary binary artifact: an archive extension
/// and either no classifier or one outside the excluded set
/// (sources/javadoc/tests/natives variants).
#[must_use]
pub fn is_primary_archive(file_name: &str, coordinate: &ArtifactCoordinate) -> bool {
    let path = Path::new(file_name);
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    if !ARCHIVE_EXTENSIONS.contains(&ext) {
        return false;
    }
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };

    let expected = format!("{}-{}", coordinate.artifact, coordinate.version);
    if stem == expected {
        return true;
    }
    match stem.strip_prefix(&format!("{expected}-")) {
        Some(classifier) => {
            !EXCLUDED_CLASSIFIERS.contains(&classifier) && !classifier.starts_with("natives-")
        }
        // Stem doesn't match the artifact-version convention; not this
        // coordinate's primary archive.
        None => false,
    }
}
