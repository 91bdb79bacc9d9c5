//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use m2_janitor::audit::report::{ReportStore, is_report_fresh};
use m2_janitor::audit::run_state::{RunThrottle, ThrottleDecision};
use m2_janitor::audit::{AuditSummary, reconcile};
use m2_janitor::collector::{Provenance, UsageCollector, UsageRecord, UsageSet};
use m2_janitor::core::config::Config;
use m2_janitor::core::errors::M2jError;
use m2_janitor::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};
use m2_janitor::logger::jsonl::JsonlConfig;
use m2_janitor::scanner::protection::ProtectionPolicy;
use m2_janitor::scanner::purge::{PurgeExecutor, PurgeOptions};
use m2_janitor::scanner::walker::{CacheScanner, ScanConfig, downloaded_since};

/// m2j — audits the local Maven artifact cache against observed usage.
#[derive(Debug, Parser)]
#[command(
    name = "m2j",
    author,
    version,
    about = "Maven cache janitor - audit and prune unused artifacts",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Audit the cache against project usage; optionally delete unused artifacts.
    Audit(AuditArgs),
    /// Show the most recent audit reports.
    Report(ReportArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Show version information.
    Version,
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct AuditArgs {
    /// Use only static descriptor parsing (skip build-tool invocation).
    #[arg(long)]
    without_transitive: bool,
    /// Delete confirmed-unused artifacts from the cache.
    #[arg(long)]
    delete_unused: bool,
    /// Count and report deletions without removing anything.
    #[arg(long)]
    dry_run: bool,
    /// Bypass the minimum-interval run throttle.
    #[arg(long)]
    force: bool,
    /// Re-collect usage even when a fresh cached report exists.
    #[arg(long)]
    no_report_cache: bool,
    /// Repository roots to audit (defaults to configured roots).
    #[arg(value_name = "REPO_PATH")]
    repo_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Args, Default)]
struct ReportArgs {
    /// Print report contents instead of just paths.
    #[arg(long)]
    show: bool,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the effective config file path.
    Path,
    /// Print the effective configuration as TOML.
    Show,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Audit(args) => run_audit(cli, args),
        Command::Report(args) => run_report(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version => emit_version(cli),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── audit ────────────────────

#[allow(clippy::too_many_lines)]
fn run_audit(cli: &Cli, args: &AuditArgs) -> Result<(), CliError> {
    let started = Instant::now();
    let mut config = load_config(cli)?;
    config.collector.without_transitive |= args.without_transitive;
    config.purge.dry_run |= args.dry_run;

    let (logger, logger_join) = spawn_logger(JsonlConfig {
        path: config.paths.jsonl_log.clone(),
        ..JsonlConfig::default()
    })
    .map_err(|e| CliError::Runtime(e.to_string()))?;

    let result = audit_pipeline(cli, args, &config, &logger, started);

    logger.shutdown();
    let _ = logger_join.join();
    result
}

#[allow(clippy::too_many_lines)]
fn audit_pipeline(
    cli: &Cli,
    args: &AuditArgs,
    config: &Config,
    logger: &ActivityLoggerHandle,
    started: Instant,
) -> Result<(), CliError> {
    let now = SystemTime::now();
    let throttle = RunThrottle::new(
        config.paths.last_run_file.clone(),
        config.reports.min_run_interval_days,
    );

    if let ThrottleDecision::NeedsConfirmation {
        last_run,
        remaining,
    } = throttle.should_run(now, args.force)
    {
        let days_ago = now
            .duration_since(last_run)
            .map_or(0, |d| d.as_secs() / 86_400);
        let days_left = remaining.as_secs().div_ceil(86_400);
        if !confirm(&format!(
            "last audit ran {days_ago} day(s) ago; the minimum interval leaves {days_left} day(s). Continue anyway?"
        ))? {
            // User decline is a normal early return, not an error.
            emit_notice(cli, "audit skipped: minimum run interval not elapsed");
            return Ok(());
        }
    }

    logger.send(ActivityEvent::AuditStarted {
        version: env!("CARGO_PKG_VERSION").to_string(),
        repo_roots: if args.repo_paths.is_empty() {
            config.repos.root_paths.len()
        } else {
            args.repo_paths.len()
        },
    });

    let mut summary = AuditSummary::default();
    let run_start = SystemTime::now();

    // ── use-set: reuse a fresh report or collect ──
    let store = ReportStore::new(config.reports.output_dir.clone());
    let cached_report = if args.no_report_cache {
        None
    } else {
        store
            .latest_used_report()
            .filter(|p| is_report_fresh(p, run_start, config.reports.report_age_limit_days))
    };

    match cached_report {
        Some(path) => {
            let coordinates = ReportStore::load_use_set(&path)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            emit_notice(
                cli,
                &format!("reusing fresh usage report {}", path.display()),
            );
            summary.usage = UsageSet {
                records: coordinates
                    .into_iter()
                    .map(|coordinate| UsageRecord {
                        coordinate,
                        provenance: Provenance::Declared,
                    })
                    .collect(),
                ..UsageSet::default()
            };
            summary.reused_report = Some(path);
        }
        None => {
            let collector = UsageCollector::new(config.collector.clone(), Some(logger.clone()));
            let roots = if args.repo_paths.is_empty() {
                config.repos.root_paths.clone()
            } else {
                args.repo_paths.clone()
            };
            summary.usage = collector.collect(
                &roots,
                &config.repos.excluded_paths,
                config.repos.max_module_depth,
            );
        }
    }

    for warning in &summary.usage.warnings {
        emit_warning(cli, warning);
        logger.send(ActivityEvent::Warning {
            code: "M2J-4002".to_string(),
            message: warning.clone(),
        });
    }

    // ── installed set: the cache scan always re-runs ──
    let scanner = CacheScanner::new(ScanConfig {
        cache_root: config.cache.root.clone(),
        stale_lock_age: std::time::Duration::from_secs(config.purge.stale_lock_age_minutes * 60),
    });
    let scan_started = Instant::now();
    let scan = match scanner.scan() {
        Ok(scan) => scan,
        Err(err @ M2jError::CacheRootMissing { .. }) => {
            // The audit phase is skipped; the usage side still stands alone.
            emit_warning(cli, &err.to_string());
            logger.send(ActivityEvent::Warning {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            let mut used: Vec<_> = summary.usage.coordinates().into_iter().collect();
            used.sort_by(m2_janitor::audit::compare_coordinates);
            summary.outcome.used = used;
            emit_audit_summary(cli, &summary, started)?;
            return Ok(());
        }
        Err(err) => return Err(CliError::Runtime(err.to_string())),
    };
    #[allow(clippy::cast_possible_truncation)]
    logger.send(ActivityEvent::CacheScanned {
        artifacts: scan.artifacts.len(),
        skipped_subtrees: scan.skipped_subtrees,
        duration_ms: scan_started.elapsed().as_millis() as u64,
    });
    summary.installed = scan.artifacts.len();
    summary.skipped_subtrees = scan.skipped_subtrees;

    // ── downloaded-during-run signal (only when the tool actually ran) ──
    if summary.reused_report.is_none() && !config.collector.without_transitive {
        for coordinate in downloaded_since(&scan.artifacts, run_start) {
            summary.usage.add_downloaded(coordinate);
        }
    }

    // ── reconcile + reports ──
    let policy = ProtectionPolicy::new(&config.protection, &scan.artifacts);
    let used_set = summary.usage.coordinates();
    summary.outcome = reconcile(&scan.artifacts, &used_set, &policy);

    let written = store
        .write_reports(
            &summary.outcome.used,
            &summary.outcome.unused,
            chrono::Utc::now(),
        )
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    logger.send(ActivityEvent::ReportWritten {
        path: written.used_path.to_string_lossy().to_string(),
        rows: summary.outcome.used.len(),
    });
    logger.send(ActivityEvent::ReportWritten {
        path: written.unused_path.to_string_lossy().to_string(),
        rows: summary.outcome.unused.len(),
    });
    summary.reports = Some(written);

    // ── purge ──
    if args.delete_unused {
        let executor = PurgeExecutor::new(
            PurgeOptions {
                max_attempts: config.purge.max_attempts,
                dry_run: config.purge.dry_run,
            },
            Some(logger.clone()),
        );
        let mut purge_report = executor.purge(&summary.outcome.unused, &config.cache.root);
        if config.purge.remove_stale_locks {
            purge_report.locks_swept = executor.sweep_stale_locks(&scan.stale_locks);
        }
        let clean = purge_report.failed == 0 && !purge_report.dry_run;
        summary.purge = Some(purge_report);
        if clean {
            throttle
                .record_run(SystemTime::now())
                .map_err(|e| CliError::Runtime(e.to_string()))?;
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    logger.send(ActivityEvent::AuditCompleted {
        used: summary.outcome.used.len(),
        unused: summary.outcome.unused.len(),
        protected: summary.outcome.protected.len(),
        duration_ms: started.elapsed().as_millis() as u64,
    });

    emit_audit_summary(cli, &summary, started)?;
    Ok(())
}

#[allow(clippy::cast_possible_truncation)]
fn emit_audit_summary(cli: &Cli, summary: &AuditSummary, started: Instant) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Json => {
            let payload = json!({
                "command": "audit",
                "modules": summary.usage.modules.len(),
                "use_set": summary.usage.records.len(),
                "installed": summary.installed,
                "skipped_subtrees": summary.skipped_subtrees,
                "used": summary.outcome.used.len(),
                "unused": summary.outcome.unused.len(),
                "protected": summary.outcome.protected.len(),
                "reused_report": summary.reused_report.as_ref().map(|p| p.display().to_string()),
                "used_report": summary.reports.as_ref().map(|r| r.used_path.display().to_string()),
                "unused_report": summary.reports.as_ref().map(|r| r.unused_path.display().to_string()),
                "purge": summary.purge.as_ref().map(|p| json!({
                    "deleted": p.deleted,
                    "failed": p.failed,
                    "missing": p.missing,
                    "freed_bytes": p.freed_bytes,
                    "passes": p.passes,
                    "dry_run": p.dry_run,
                    "locks_swept": p.locks_swept,
                })),
                "duration_ms": started.elapsed().as_millis() as u64,
            });
            write_json_line(&payload)
        }
        OutputMode::Human => {
            if cli.quiet {
                return Ok(());
            }
            println!(
                "{} {} modules, {} installed artifacts",
                "audit:".bold(),
                summary.usage.modules.len(),
                summary.installed
            );
            if cli.verbose {
                for outcome in &summary.usage.modules {
                    println!(
                        "  {} {} ({} coordinates via {})",
                        "module".dimmed(),
                        outcome.module.display(),
                        outcome.coordinates,
                        outcome.source
                    );
                }
            }
            println!(
                "  {} {}   {} {}   {} {}",
                "used".green(),
                summary.outcome.used.len(),
                "unused".yellow(),
                summary.outcome.unused.len(),
                "protected".cyan(),
                summary.outcome.protected.len()
            );
            if let Some(path) = &summary.reused_report {
                println!("  use-set reloaded from {}", path.display());
            }
            if let Some(reports) = &summary.reports {
                println!("  reports: {}", reports.used_path.display());
                println!("           {}", reports.unused_path.display());
            }
            if let Some(purge) = &summary.purge {
                let label = if purge.dry_run { "would free" } else { "freed" };
                println!(
                    "  {} {} deleted, {} failed, {} already gone, {} {}",
                    if purge.dry_run {
                        "purge (dry-run):".bold()
                    } else {
                        "purge:".bold()
                    },
                    purge.deleted,
                    purge.failed,
                    purge.missing,
                    label,
                    format_bytes(purge.freed_bytes)
                );
                if purge.locks_swept > 0 {
                    println!("  swept {} stale lock file(s)", purge.locks_swept);
                }
            }
            Ok(())
        }
    }
}

// ──────────────────── report ────────────────────

fn run_report(cli: &Cli, args: &ReportArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let store = ReportStore::new(config.reports.output_dir.clone());

    let Some(latest) = store.latest_used_report() else {
        emit_notice(cli, "no audit reports found; run `m2j audit` first");
        return Ok(());
    };

    match output_mode(cli) {
        OutputMode::Json => {
            let rows = ReportStore::load_use_set(&latest)
                .map_err(|e| CliError::Runtime(e.to_string()))?;
            let payload = json!({
                "command": "report",
                "latest_used_report": latest.display().to_string(),
                "rows": rows.len(),
                "coordinates": rows.iter().map(ToString::to_string).collect::<Vec<_>>(),
            });
            write_json_line(&payload)
        }
        OutputMode::Human => {
            println!("latest used report: {}", latest.display());
            if args.show {
                let contents = std::fs::read_to_string(&latest)?;
                print!("{contents}");
            }
            Ok(())
        }
    }
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    match args.command.as_ref().unwrap_or(&ConfigCommand::Show) {
        ConfigCommand::Path => {
            println!("{}", config.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Show => match output_mode(cli) {
            OutputMode::Json => {
                let payload = serde_json::to_value(&config)?;
                write_json_line(&payload)
            }
            OutputMode::Human => {
                let rendered = toml::to_string_pretty(&config)
                    .map_err(|e| CliError::Runtime(e.to_string()))?;
                print!("{rendered}");
                Ok(())
            }
        },
    }
}

// ──────────────────── version ────────────────────

fn emit_version(cli: &Cli) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Json => write_json_line(&json!({
            "name": "m2j",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        OutputMode::Human => {
            println!("m2j {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

// ──────────────────── shared helpers ────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|e| CliError::User(e.to_string()))
}

fn output_mode(cli: &Cli) -> OutputMode {
    if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    stdout.write_all(b"\n")?;
    Ok(())
}

fn emit_notice(cli: &Cli, message: &str) {
    if cli.quiet {
        return;
    }
    match output_mode(cli) {
        OutputMode::Human => println!("m2j: {message}"),
        OutputMode::Json => {
            let _ = write_json_line(&json!({"notice": message}));
        }
    }
}

fn emit_warning(cli: &Cli, message: &str) {
    if cli.quiet {
        return;
    }
    eprintln!("{} {message}", "m2j:".yellow());
}

/// Interactive yes/no prompt. A non-terminal stdin counts as a decline so
/// unattended runs never hang on the throttle gate.
fn confirm(question: &str) -> Result<bool, CliError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(false);
    }
    print!("m2j: {question} [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    stdin
        .read_line(&mut input)
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
    }

    #[test]
    fn cli_error_exit_codes() {
        assert_eq!(CliError::User("bad".into()).exit_code(), 1);
        assert_eq!(CliError::Runtime("env".into()).exit_code(), 2);
    }

    #[test]
    fn cli_parses_audit_flags() {
        let cli = Cli::try_parse_from([
            "m2j",
            "audit",
            "--without-transitive",
            "--delete-unused",
            "--force",
            "/data/src",
        ])
        .unwrap();
        match cli.command {
            Command::Audit(args) => {
                assert!(args.without_transitive);
                assert!(args.delete_unused);
                assert!(args.force);
                assert!(!args.dry_run);
                assert_eq!(args.repo_paths, vec![PathBuf::from("/data/src")]);
            }
            _ => panic!("expected audit command"),
        }
    }

    #[test]
    fn cli_rejects_conflicting_verbosity() {
        assert!(Cli::try_parse_from(["m2j", "-v", "-q", "version"]).is_err());
    }
}
