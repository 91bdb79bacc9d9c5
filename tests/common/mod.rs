use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_m2j") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "m2j.exe" } else { "m2j" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve m2j binary path for integration test"),
    }
}

/// Run the m2j binary with `args`, overriding `HOME` so every default path
/// (cache root, reports, state, log) stays inside the test sandbox.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("m2j-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute m2j command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_content = format!(
        "case: {case_name}\nargs: {args:?}\nstatus: {:?}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
        output.status
    );
    let _ = fs::write(&log_path, log_content);

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// Lay down an installed artifact (jar + pom + sidecars) under a cache root.
pub fn install_artifact(cache_root: &Path, group: &str, artifact: &str, version: &str) -> PathBuf {
    let mut dir = cache_root.to_path_buf();
    for seg in group.split('.') {
        dir.push(seg);
    }
    dir.push(artifact);
    dir.push(version);
    fs::create_dir_all(&dir).expect("create artifact dir");
    fs::write(dir.join(format!("{artifact}-{version}.jar")), b"jar bytes")
        .expect("write artifact jar");
    fs::write(dir.join(format!("{artifact}-{version}.pom")), b"<project/>")
        .expect("write artifact pom");
    fs::write(dir.join("_remote.repositories"), b"").expect("write sidecar");
    dir
}

/// Write a minimal project module declaring the given dependencies.
pub fn write_module(dir: &Path, deps: &[(&str, &str, &str)]) {
    fs::create_dir_all(dir).expect("create module dir");
    let mut pom = String::from(
        "<project>\n  <groupId>com.example</groupId>\n  <artifactId>app</artifactId>\n  <version>1.0.0</version>\n  <dependencies>\n",
    );
    for (group, artifact, version) in deps {
        pom.push_str(&format!(
            "    <dependency>\n      <groupId>{group}</groupId>\n      <artifactId>{artifact}</artifactId>\n      <version>{version}</version>\n    </dependency>\n"
        ));
    }
    pom.push_str("  </dependencies>\n</project>\n");
    fs::write(dir.join("pom.xml"), pom).expect("write pom.xml");
}
