//! Process supervision for build-tool invocations.
//!
//! One abstraction replaces ad-hoc wait loops: spawn the tool in its own
//! process group, capture stdout on a reader thread, wait with a bounded
//! timeout (emitting periodic progress notices), and on timeout terminate
//! the whole process tree before reporting `ListingTimeout`. A timeout
//! aborts only the current invocation — callers decide how to degrade.

#![allow(missing_docs)]

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::{M2jError, Result};

/// Supervision knobs derived from `CollectorConfig`.
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// Hard upper bound on one invocation.
    pub timeout: Duration,
    /// Interval between progress notices while waiting.
    pub progress_interval: Duration,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            progress_interval: Duration::from_secs(15),
        }
    }
}

/// Runs external commands with bounded waits and tree termination.
pub struct Invoker {
    config: InvokerConfig,
}

/// Poll cadence while waiting on the child.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Grace period between SIGTERM and SIGKILL when terminating a tree.
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

impl Invoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self { config }
    }

    /// Run `program` with `args` in `cwd`, returning captured stdout.
    ///
    /// The exit status is deliberately not inspected: listing goals can exit
    /// non-zero while still emitting usable rows, and an empty result already
    /// drives the caller's fallback ladder. `module` labels errors and
    /// progress notices.
    pub fn run_captured(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        module: &Path,
    ) -> Result<String> {
        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // Own process group: lets a timeout kill the tool and every child it
        // forked (wrapper scripts, JVMs) in one signal.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                M2jError::ToolUnavailable {
                    tool: program.to_string(),
                }
            } else {
                M2jError::io(cwd, err)
            }
        })?;

        let mut stdout = child.stdout.take().ok_or_else(|| M2jError::Runtime {
            details: format!("no stdout pipe for {program}"),
        })?;
        let reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stdout.read_to_string(&mut buf);
            buf
        });

        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let mut next_notice = started + self.config.progress_interval;

        loop {
            match child.try_wait() {
                Ok(Some(_status)) => {
                    return Ok(reader.join().unwrap_or_default());
                }
                Ok(None) => {
                    let now = Instant::now();
                    if now >= deadline {
                        terminate_tree(&mut child);
                        let _ = reader.join();
                        return Err(M2jError::ListingTimeout {
                            module: module.to_path_buf(),
                            secs: self.config.timeout.as_secs(),
                        });
                    }
                    if now >= next_notice {
                        eprintln!(
                            "m2j: still waiting on {program} for {} ({}s elapsed)",
                            module.display(),
                            started.elapsed().as_secs()
                        );
                        next_notice = now + self.config.progress_interval;
                    }
                    thread::sleep(WAIT_POLL);
                }
                Err(err) => {
                    terminate_tree(&mut child);
                    let _ = reader.join();
                    return Err(M2jError::io(cwd, err));
                }
            }
        }
    }
}

/// Kill the child's entire process group: SIGTERM, a short grace period,
/// then SIGKILL. Always reaps the child.
fn terminate_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let pgid = Pid::from_raw(child.id() as i32);
        let _ = killpg(pgid, Signal::SIGTERM);

        let deadline = Instant::now() + TERMINATE_GRACE;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return;
            }
            thread::sleep(Duration::from_millis(25));
        }
        let _ = killpg(pgid, Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }

    let _ = child.wait();
}

/// Probe PATH for a tool binary. Returns its resolved path when found.
#[must_use]
pub fn find_tool(tool: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(tool);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.is_file()
            && std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoker(timeout_ms: u64) -> Invoker {
        Invoker::new(InvokerConfig {
            timeout: Duration::from_millis(timeout_ms),
            progress_interval: Duration::from_secs(60),
        })
    }

    #[test]
    fn captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = invoker(5_000)
            .run_captured("sh", &["-c", "echo listing-row"], dir.path(), dir.path())
            .unwrap();
        assert_eq!(out.trim(), "listing-row");
    }

    #[test]
    fn nonzero_exit_still_returns_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = invoker(5_000)
            .run_captured("sh", &["-c", "echo partial; exit 3"], dir.path(), dir.path())
            .unwrap();
        assert_eq!(out.trim(), "partial");
    }

    #[test]
    fn missing_tool_is_tool_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = invoker(5_000)
            .run_captured("m2j-no-such-binary", &[], dir.path(), dir.path())
            .unwrap_err();
        assert_eq!(err.code(), "M2J-4001");
    }

    #[test]
    fn timeout_kills_process_tree() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = invoker(200)
            .run_captured("sh", &["-c", "sleep 30"], dir.path(), dir.path())
            .unwrap_err();
        assert_eq!(err.code(), "M2J-4003");
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "timeout must not wait for the child's natural exit"
        );
    }

    #[test]
    fn timeout_error_names_the_module() {
        let dir = tempfile::tempdir().unwrap();
        let module = dir.path().join("myapp");
        std::fs::create_dir_all(&module).unwrap();
        let err = invoker(150)
            .run_captured("sh", &["-c", "sleep 30"], &module, &module)
            .unwrap_err();
        assert!(err.to_string().contains("myapp"));
    }

    #[test]
    fn find_tool_locates_sh() {
        assert!(find_tool("sh").is_some());
    }

    #[test]
    fn find_tool_misses_nonsense() {
        assert!(find_tool("m2j-definitely-not-installed").is_none());
    }
}
