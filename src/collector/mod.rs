//! Usage collector: builds the use-set by asking the build tool what each
//! project module actually resolves.
//!
//! Fallback ladder per module, never fatal:
//! 1. Scoped `dependency:list` per configured scope (strict normalizer).
//! 2. One unscoped `dependency:tree` when the scoped union is empty — some
//!    corporate/offline resolution policies yield empty list output even
//!    though dependencies exist.
//! 3. Static descriptor parse when the tool is unavailable, an invocation
//!    times out, or both listings come back empty.
//!
//! An empty use-set for a module is a valid result.

#![allow(missing_docs)]

pub mod descriptor;
pub mod invoker;
pub mod listing;

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::config::CollectorConfig;
use crate::core::errors::M2jError;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::codec::ArtifactCoordinate;

use invoker::{Invoker, InvokerConfig};

/// How a coordinate entered the use-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Found via dependency listing or descriptor parse.
    Declared,
    /// Newly fetched into the cache during this run (mtime delta).
    Downloaded,
}

/// One use-set member with provenance. Created fresh each audit run and
/// superseded on the next.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub coordinate: ArtifactCoordinate,
    pub provenance: Provenance,
}

/// Which rung of the fallback ladder produced a module's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSource {
    ScopedListing,
    TreeFallback,
    StaticDescriptor,
}

impl fmt::Display for ListingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScopedListing => f.write_str("scoped-listing"),
            Self::TreeFallback => f.write_str("tree-fallback"),
            Self::StaticDescriptor => f.write_str("static-descriptor"),
        }
    }
}

/// Per-module collection outcome for the run report.
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    pub module: PathBuf,
    pub coordinates: usize,
    pub source: ListingSource,
}

/// Accumulated result of the collection phase.
#[derive(Debug, Clone, Default)]
pub struct UsageSet {
    pub records: Vec<UsageRecord>,
    pub modules: Vec<ModuleOutcome>,
    pub warnings: Vec<String>,
}

impl UsageSet {
    /// Deduplicated coordinate view for reconciliation.
    #[must_use]
    pub fn coordinates(&self) -> HashSet<ArtifactCoordinate> {
        self.records.iter().map(|r| r.coordinate.clone()).collect()
    }

    /// Add a downloaded-during-run record unless already declared.
    pub fn add_downloaded(&mut self, coordinate: ArtifactCoordinate) {
        if self.records.iter().any(|r| r.coordinate == coordinate) {
            return;
        }
        self.records.push(UsageRecord {
            coordinate,
            provenance: Provenance::Downloaded,
        });
    }
}

/// Walks modules and runs the fallback ladder for each.
pub struct UsageCollector {
    config: CollectorConfig,
    invoker: Invoker,
    logger: Option<ActivityLoggerHandle>,
}

impl UsageCollector {
    pub fn new(config: CollectorConfig, logger: Option<ActivityLoggerHandle>) -> Self {
        let invoker = Invoker::new(InvokerConfig {
            timeout: Duration::from_secs(config.timeout_secs),
            progress_interval: Duration::from_secs(config.progress_interval_secs.max(1)),
        });
        Self {
            config,
            invoker,
            logger,
        }
    }

    /// Discover project modules (directories holding a `pom.xml`) under a
    /// repository root. Hidden directories and build output are not descended
    /// into; results are sorted for deterministic processing order.
    #[must_use]
    pub fn discover_modules(
        &self,
        root: &Path,
        excluded: &[PathBuf],
        max_depth: usize,
    ) -> Vec<PathBuf> {
        let mut modules = Vec::new();
        let mut queue: Vec<(PathBuf, usize)> = vec![(root.to_path_buf(), 0)];

        while let Some((dir, depth)) = queue.pop() {
            if excluded.iter().any(|e| dir.starts_with(e)) {
                continue;
            }
            if dir.join("pom.xml").is_file() {
                modules.push(dir.clone());
            }
            if depth >= max_depth {
                continue;
            }
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let Ok(ft) = entry.file_type() else {
                    continue;
                };
                if !ft.is_dir() {
                    continue;
                }
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') || name == "target" || name == "node_modules" {
                    continue;
                }
                queue.push((entry.path(), depth + 1));
            }
        }

        modules.sort();
        modules
    }

    /// Collect every module under every repository root into one use-set.
    pub fn collect(
        &self,
        repo_roots: &[PathBuf],
        excluded: &[PathBuf],
        max_depth: usize,
    ) -> UsageSet {
        let mut usage = UsageSet::default();
        let mut seen: HashSet<ArtifactCoordinate> = HashSet::new();

        for root in repo_roots {
            if !root.is_dir() {
                usage
                    .warnings
                    .push(format!("repository root missing: {}", root.display()));
                continue;
            }
            for module in self.discover_modules(root, excluded, max_depth) {
                let (coordinates, source) = self.collect_module(&module, &mut usage.warnings);
                self.log(ActivityEvent::ModuleListed {
                    module: module.to_string_lossy().to_string(),
                    coordinates: coordinates.len(),
                    source: source.to_string(),
                });
                usage.modules.push(ModuleOutcome {
                    module,
                    coordinates: coordinates.len(),
                    source,
                });
                for coordinate in coordinates {
                    if seen.insert(coordinate.clone()) {
                        usage.records.push(UsageRecord {
                            coordinate,
                            provenance: Provenance::Declared,
                        });
                    }
                }
            }
        }

        usage
    }

    /// Run the fallback ladder for one module.
    pub fn collect_module(
        &self,
        module: &Path,
        warnings: &mut Vec<String>,
    ) -> (HashSet<ArtifactCoordinate>, ListingSource) {
        if self.config.without_transitive {
            return (self.static_parse(module, warnings), ListingSource::StaticDescriptor);
        }

        if !self.tool_available() {
            let err = M2jError::ToolUnavailable {
                tool: self.config.tool.clone(),
            };
            self.warn_fallback(module, "static-descriptor", &err.to_string(), warnings);
            return (self.static_parse(module, warnings), ListingSource::StaticDescriptor);
        }

        // Rung 1: scoped listings.
        let mut union: HashSet<ArtifactCoordinate> = HashSet::new();
        for scope in &self.config.scopes {
            let scope_arg = format!("-DincludeScope={scope}");
            let args = ["--batch-mode", "dependency:list", scope_arg.as_str()];
            match self
                .invoker
                .run_captured(&self.config.tool, &args, module, module)
            {
                Ok(output) => {
                    union.extend(listing::parse_list_output(&output));
                }
                Err(err @ M2jError::ListingTimeout { .. }) => {
                    // A timeout aborts this module's listing, not the run.
                    self.warn_fallback(module, "static-descriptor", &err.to_string(), warnings);
                    return (self.static_parse(module, warnings), ListingSource::StaticDescriptor);
                }
                Err(err @ M2jError::ToolUnavailable { .. }) => {
                    self.warn_fallback(module, "static-descriptor", &err.to_string(), warnings);
                    return (self.static_parse(module, warnings), ListingSource::StaticDescriptor);
                }
                Err(err) => {
                    warnings.push(format!(
                        "scope {scope} listing failed for {}: {err}",
                        module.display()
                    ));
                }
            }
        }
        if !union.is_empty() {
            return (union, ListingSource::ScopedListing);
        }

        // Rung 2: one unscoped tree listing.
        let empty = M2jError::ListingEmpty {
            module: module.to_path_buf(),
        };
        self.warn_fallback(module, "tree-fallback", &empty.to_string(), warnings);
        match self.invoker.run_captured(
            &self.config.tool,
            &["--batch-mode", "dependency:tree"],
            module,
            module,
        ) {
            Ok(output) => {
                let coordinates: HashSet<_> =
                    listing::parse_tree_output(&output).into_iter().collect();
                if !coordinates.is_empty() {
                    return (coordinates, ListingSource::TreeFallback);
                }
            }
            Err(err) => {
                self.warn_fallback(module, "static-descriptor", &err.to_string(), warnings);
            }
        }

        // Rung 3: static descriptor.
        (self.static_parse(module, warnings), ListingSource::StaticDescriptor)
    }

    fn static_parse(&self, module: &Path, warnings: &mut Vec<String>) -> HashSet<ArtifactCoordinate> {
        match descriptor::parse_descriptor(&module.join("pom.xml")) {
            Ok(coordinates) => coordinates.into_iter().collect(),
            Err(err) => {
                warnings.push(format!(
                    "descriptor parse failed for {}: {err}",
                    module.display()
                ));
                HashSet::new()
            }
        }
    }

    fn tool_available(&self) -> bool {
        let tool = Path::new(&self.config.tool);
        if tool.components().count() > 1 {
            return tool.is_file();
        }
        invoker::find_tool(&self.config.tool).is_some()
    }

    fn warn_fallback(&self, module: &Path, fallback: &str, reason: &str, warnings: &mut Vec<String>) {
        warnings.push(format!(
            "{}: falling back to {fallback}: {reason}",
            module.display()
        ));
        self.log(ActivityEvent::ListingFallback {
            module: module.to_string_lossy().to_string(),
            fallback: fallback.to_string(),
            reason: reason.to_string(),
        });
    }

    fn log(&self, event: ActivityEvent) {
        if let Some(logger) = &self.logger {
            logger.send(event);
        }
    }
}
