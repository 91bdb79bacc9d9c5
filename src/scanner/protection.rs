//! Protection policy: rules preventing deletion of artifacts still needed or
//! structurally important.
//!
//! Rules evaluate in order, first match decides:
//! 1. Core-infrastructure group prefix — protected only while it is the
//!    version-latest instance of its (group, artifact) or still in the
//!    use-set; old unused core versions remain purgeable.
//! 2. Plugin naming convention (when enabled).
//! 3. Version-latest instance (when enabled).
//! 4. Otherwise not protected.

#![allow(missing_docs)]

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::config::ProtectionConfig;
use crate::scanner::codec::ArtifactCoordinate;
use crate::scanner::version;
use crate::scanner::walker::InstalledArtifact;

/// Why an artifact was excluded from deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectionReason {
    /// Group prefix is on the core-infrastructure list.
    CoreInfrastructure { prefix: String },
    /// Artifact name follows the build-plugin naming convention.
    BuildPlugin,
    /// Version-latest instance of its (group, artifact).
    LatestVersion,
    /// Snapshot/range/placeholder version — unsafe to delete, applied by the
    /// reconciler rather than the rule chain.
    MutableVersion,
}

impl fmt::Display for ProtectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CoreInfrastructure { prefix } => {
                write!(f, "core infrastructure (prefix {prefix})")
            }
            Self::BuildPlugin => f.write_str("build plugin"),
            Self::LatestVersion => f.write_str("latest installed version"),
            Self::MutableVersion => f.write_str("mutable version"),
        }
    }
}

/// Compiled protection rules plus the per-run latest-version index.
#[derive(Debug)]
pub struct ProtectionPolicy {
    core_group_prefixes: Vec<String>,
    protect_plugins: bool,
    protect_latest: bool,
    /// (group, artifact) -> latest installed version, built once per run.
    latest_index: HashMap<(String, String), String>,
}

impl ProtectionPolicy {
    /// Build the policy for one run from config plus the installed set.
    pub fn new(config: &ProtectionConfig, installed: &[InstalledArtifact]) -> Self {
        let mut latest_index: HashMap<(String, String), String> = HashMap::new();
        for artifact in installed {
            let key = artifact.coordinate.key();
            match latest_index.get_mut(&key) {
                Some(current) => {
                    if version::compare(&artifact.coordinate.version, current)
                        == std::cmp::Ordering::Greater
                    {
                        *current = artifact.coordinate.version.clone();
                    }
                }
                None => {
                    latest_index.insert(key, artifact.coordinate.version.clone());
                }
            }
        }

        Self {
            core_group_prefixes: config.core_group_prefixes.clone(),
            protect_plugins: config.protect_plugins,
            protect_latest: config.protect_latest,
            latest_index,
        }
    }

    /// Whether a coordinate is the version-latest installed instance of its
    /// (group, artifact).
    #[must_use]
    pub fn is_latest(&self, coordinate: &ArtifactCoordinate) -> bool {
        self.latest_index
            .get(&coordinate.key())
            .is_some_and(|latest| latest == &coordinate.version)
    }

    /// Evaluate the rule chain for a deletion candidate.
    ///
    /// `used` is the reconciled use-set; rule 1 consults it so an in-use core
    /// artifact stays protected even when a newer version is installed.
    #[must_use]
    pub fn evaluate(
        &self,
        coordinate: &ArtifactCoordinate,
        used: &HashSet<ArtifactCoordinate>,
    ) -> Option<ProtectionReason> {
        let is_latest = self.is_latest(coordinate);

        if let Some(prefix) = self.matching_core_prefix(&coordinate.group) {
            // First match decides: an old, unused core version is purgeable.
            if is_latest || used.contains(coordinate) {
                return Some(ProtectionReason::CoreInfrastructure {
                    prefix: prefix.to_string(),
                });
            }
            return None;
        }

        if self.protect_plugins && coordinate.has_plugin_naming() {
            return Some(ProtectionReason::BuildPlugin);
        }

        if self.protect_latest && is_latest {
            return Some(ProtectionReason::LatestVersion);
        }

        None
    }

    /// Number of (group, artifact) pairs in the latest index.
    #[must_use]
    pub fn indexed_pairs(&self) -> usize {
        self.latest_index.len()
    }

    fn matching_core_prefix(&self, group: &str) -> Option<&str> {
        self.core_group_prefixes
            .iter()
            .map(String::as_str)
            .find(|prefix| {
                group == *prefix
                    || (group.len() > prefix.len()
                        && group.starts_with(prefix)
                        && group.as_bytes()[prefix.len()] == b'.')
            })
    }
}
