//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{M2jError, Result};
use crate::core::paths::{expand_tilde, home_dir};

/// Resolution scopes the collector may restrict listings to.
pub const KNOWN_SCOPES: &[&str] = &["compile", "runtime", "test", "provided", "system"];

/// Full m2j configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub repos: ReposConfig,
    pub cache: CacheConfig,
    pub collector: CollectorConfig,
    pub protection: ProtectionConfig,
    pub purge: PurgeConfig,
    pub reports: ReportsConfig,
    pub paths: PathsConfig,
}

/// Project checkout roots to collect usage from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReposConfig {
    /// Directories scanned for project modules (each module = a `pom.xml` dir).
    pub root_paths: Vec<PathBuf>,
    /// Subtrees never descended into during module discovery.
    pub excluded_paths: Vec<PathBuf>,
    /// Maximum directory depth when discovering modules under a root.
    pub max_module_depth: usize,
}

/// Local artifact cache location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// Root of the shared artifact cache. The cache is owned by the build
    /// tool; m2j only observes and (when authorized) deletes subtrees of it.
    pub root: PathBuf,
}

/// Usage-collection behavior: which tool, which scopes, how long to wait.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectorConfig {
    /// Build tool binary invoked for dependency listings.
    pub tool: String,
    /// Resolution scopes listed per module, in order.
    pub scopes: Vec<String>,
    /// Hard upper bound on a single listing invocation, in seconds.
    pub timeout_secs: u64,
    /// Interval between progress notices while waiting on the tool.
    pub progress_interval_secs: u64,
    /// Skip tool invocation entirely and use static descriptor parsing.
    pub without_transitive: bool,
}

/// Rules preventing deletion of artifacts still needed or structurally important.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Group-name prefixes of core build-tool infrastructure.
    pub core_group_prefixes: Vec<String>,
    /// Protect artifacts whose name follows the plugin naming convention.
    pub protect_plugins: bool,
    /// Protect the version-latest instance of every (group, artifact).
    pub protect_latest: bool,
}

/// Purge executor behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PurgeConfig {
    /// Retry passes over still-existing candidates.
    pub max_attempts: u32,
    /// Count and report without deleting.
    pub dry_run: bool,
    /// Sweep stale `.lock`/`.part` files left by interrupted downloads.
    pub remove_stale_locks: bool,
    /// Minimum age before a lock file counts as stale.
    pub stale_lock_age_minutes: u64,
}

/// Report persistence and run throttling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportsConfig {
    /// Directory receiving timestamped used/unused CSV reports.
    pub output_dir: PathBuf,
    /// A used-report younger than this may be reloaded as the use-set.
    pub report_age_limit_days: u64,
    /// Minimum days between deleting runs; shorter gaps require confirmation.
    pub min_run_interval_days: u64,
}

/// Filesystem paths used by m2j itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub last_run_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for ReposConfig {
    fn default() -> Self {
        Self {
            root_paths: vec![home_dir().join("src")],
            excluded_paths: Vec::new(),
            max_module_depth: 6,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: home_dir().join(".m2").join("repository"),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tool: "mvn".to_string(),
            scopes: KNOWN_SCOPES.iter().map(ToString::to_string).collect(),
            timeout_secs: 300,
            progress_interval_secs: 15,
            without_transitive: false,
        }
    }
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            core_group_prefixes: vec![
                "org.apache.maven".to_string(),
                "org.codehaus.plexus".to_string(),
                "org.eclipse.aether".to_string(),
                "org.eclipse.sisu".to_string(),
                "org.sonatype".to_string(),
            ],
            protect_plugins: true,
            protect_latest: true,
        }
    }
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            dry_run: false,
            remove_stale_locks: true,
            stale_lock_age_minutes: 60,
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: data_dir().join("reports"),
            report_age_limit_days: 7,
            min_run_interval_days: 7,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data = data_dir();
        Self {
            config_file: home_dir().join(".config").join("m2j").join("config.toml"),
            last_run_file: data.join("last-run"),
            jsonl_log: data.join("activity.jsonl"),
        }
    }
}

fn data_dir() -> PathBuf {
    home_dir().join(".local").join("share").join("m2j")
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path;
    /// defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| M2jError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(M2jError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides()?;
        cfg.normalize_paths();
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        // cache
        if let Some(raw) = env_var("M2J_CACHE_ROOT") {
            self.cache.root = PathBuf::from(raw);
        }

        // collector
        if let Some(raw) = env_var("M2J_COLLECTOR_TOOL") {
            self.collector.tool = raw;
        }
        set_env_u64("M2J_COLLECTOR_TIMEOUT_SECS", &mut self.collector.timeout_secs)?;
        set_env_u64(
            "M2J_COLLECTOR_PROGRESS_INTERVAL_SECS",
            &mut self.collector.progress_interval_secs,
        )?;
        set_env_bool(
            "M2J_COLLECTOR_WITHOUT_TRANSITIVE",
            &mut self.collector.without_transitive,
        )?;
        if let Some(raw) = env_var("M2J_COLLECTOR_SCOPES") {
            self.collector.scopes = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // protection
        set_env_bool("M2J_PROTECT_PLUGINS", &mut self.protection.protect_plugins)?;
        set_env_bool("M2J_PROTECT_LATEST", &mut self.protection.protect_latest)?;

        // purge
        set_env_u32("M2J_PURGE_MAX_ATTEMPTS", &mut self.purge.max_attempts)?;
        set_env_bool("M2J_PURGE_DRY_RUN", &mut self.purge.dry_run)?;
        set_env_bool("M2J_PURGE_REMOVE_STALE_LOCKS", &mut self.purge.remove_stale_locks)?;
        set_env_u64(
            "M2J_PURGE_STALE_LOCK_AGE_MINUTES",
            &mut self.purge.stale_lock_age_minutes,
        )?;

        // reports
        if let Some(raw) = env_var("M2J_REPORTS_OUTPUT_DIR") {
            self.reports.output_dir = PathBuf::from(raw);
        }
        set_env_u64(
            "M2J_REPORTS_AGE_LIMIT_DAYS",
            &mut self.reports.report_age_limit_days,
        )?;
        set_env_u64(
            "M2J_REPORTS_MIN_RUN_INTERVAL_DAYS",
            &mut self.reports.min_run_interval_days,
        )?;

        // repos
        if let Some(raw) = env_var("M2J_REPO_ROOTS") {
            self.repos.root_paths = raw
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        Ok(())
    }

    /// Normalize paths for consistent comparison: expand `~`, strip trailing
    /// slashes from roots.
    fn normalize_paths(&mut self) {
        self.cache.root = expand_tilde(&self.cache.root);
        self.reports.output_dir = expand_tilde(&self.reports.output_dir);
        self.paths.last_run_file = expand_tilde(&self.paths.last_run_file);
        self.paths.jsonl_log = expand_tilde(&self.paths.jsonl_log);

        for path in &mut self.repos.root_paths {
            *path = expand_tilde(path);
            let s = path.to_string_lossy();
            if s.len() > 1
                && let Some(stripped) = s.strip_suffix('/')
            {
                *path = PathBuf::from(stripped);
            }
        }

        let s = self.cache.root.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.cache.root = PathBuf::from(stripped);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.collector.tool.trim().is_empty() {
            return Err(M2jError::InvalidConfig {
                details: "collector.tool must not be empty".to_string(),
            });
        }
        if self.collector.timeout_secs == 0 {
            return Err(M2jError::InvalidConfig {
                details: "collector.timeout_secs must be >= 1".to_string(),
            });
        }
        if self.collector.scopes.is_empty() {
            return Err(M2jError::InvalidConfig {
                details: "collector.scopes must not be empty".to_string(),
            });
        }
        for scope in &self.collector.scopes {
            if !KNOWN_SCOPES.contains(&scope.as_str()) {
                return Err(M2jError::InvalidConfig {
                    details: format!(
                        "collector.scopes contains unknown scope {scope:?}; known: {KNOWN_SCOPES:?}"
                    ),
                });
            }
        }

        if self.purge.max_attempts == 0 {
            return Err(M2jError::InvalidConfig {
                details: "purge.max_attempts must be >= 1".to_string(),
            });
        }

        if self.repos.max_module_depth == 0 {
            return Err(M2jError::InvalidConfig {
                details: "repos.max_module_depth must be >= 1".to_string(),
            });
        }

        if self.cache.root.as_os_str().is_empty() || self.cache.root == Path::new("/") {
            return Err(M2jError::InvalidConfig {
                details: format!(
                    "cache.root must be a non-root directory, got {:?}",
                    self.cache.root
                ),
            });
        }

        for prefix in &self.protection.core_group_prefixes {
            if prefix.trim().is_empty() {
                return Err(M2jError::InvalidConfig {
                    details: "protection.core_group_prefixes must not contain empty entries"
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn set_env_u64(name: &str, slot: &mut u64) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u64>().map_err(|error| M2jError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_u32(name: &str, slot: &mut u32) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = raw.parse::<u32>().map_err(|error| M2jError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })?;
    }
    Ok(())
}

fn set_env_bool(name: &str, slot: &mut bool) -> Result<()> {
    if let Some(raw) = env_var(name) {
        *slot = match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(M2jError::ConfigParse {
                    context: "env",
                    details: format!("{name}={raw:?}: expected boolean"),
                });
            }
        };
    }
    Ok(())
}
