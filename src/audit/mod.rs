//! Reconciler: partitions the installed set against the use-set under the
//! protection policy.
//!
//! Every installed artifact lands in exactly one partition — used, unused
//! candidate, or protected-and-excluded — and identical inputs produce
//! byte-identical reports (stable sort by group, artifact, then version
//! order).

#![allow(missing_docs)]

pub mod report;
pub mod run_state;

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::collector::UsageSet;
use crate::scanner::codec::{self, ArtifactCoordinate};
use crate::scanner::protection::{ProtectionPolicy, ProtectionReason};
use crate::scanner::purge::PurgeReport;
use crate::scanner::version;
use crate::scanner::walker::InstalledArtifact;

/// The three-way partition produced by one reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    /// installed ∩ used, sorted and deduplicated.
    pub used: Vec<ArtifactCoordinate>,
    /// installed − used with protection applied: confirmed deletion
    /// candidates.
    pub unused: Vec<InstalledArtifact>,
    /// installed − used but excluded from deletion, with the deciding reason.
    pub protected: Vec<(ArtifactCoordinate, ProtectionReason)>,
}

/// Aggregate view of one audit run, assembled from the per-phase values.
/// Reporting state is carried here explicitly rather than in ambient
/// counters.
#[derive(Debug, Default)]
pub struct AuditSummary {
    pub usage: UsageSet,
    pub installed: usize,
    pub skipped_subtrees: usize,
    pub outcome: ReconcileOutcome,
    pub reports: Option<report::WrittenReports>,
    pub purge: Option<PurgeReport>,
    /// Set when the use-set was reloaded from a fresh report instead of
    /// collected.
    pub reused_report: Option<std::path::PathBuf>,
}

/// Stable coordinate ordering: group, then artifact, then version order.
#[must_use]
pub fn compare_coordinates(a: &ArtifactCoordinate, b: &ArtifactCoordinate) -> Ordering {
    a.group
        .cmp(&b.group)
        .then_with(|| a.artifact.cmp(&b.artifact))
        .then_with(|| version::compare(&a.version, &b.version))
}

/// Partition `installed` against `used` under `policy`.
#[must_use]
pub fn reconcile(
    installed: &[InstalledArtifact],
    used: &HashSet<ArtifactCoordinate>,
    policy: &ProtectionPolicy,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut seen: HashSet<ArtifactCoordinate> = HashSet::new();

    for artifact in installed {
        let coordinate = &artifact.coordinate;
        if !seen.insert(coordinate.clone()) {
            continue;
        }

        if used.contains(coordinate) {
            outcome.used.push(coordinate.clone());
            continue;
        }

        // Mutable versions never become deletion candidates.
        if !codec::is_deletable_version(&coordinate.version) {
            outcome
                .protected
                .push((coordinate.clone(), ProtectionReason::MutableVersion));
            continue;
        }

        match policy.evaluate(coordinate, used) {
            Some(reason) => outcome.protected.push((coordinate.clone(), reason)),
            None => outcome.unused.push(artifact.clone()),
        }
    }

    outcome.used.sort_by(compare_coordinates);
    outcome
        .unused
        .sort_by(|a, b| compare_coordinates(&a.coordinate, &b.coordinate));
    outcome
        .protected
        .sort_by(|a, b| compare_coordinates(&a.0, &b.0));

    outcome
}
