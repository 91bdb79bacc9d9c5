//! Shared path manipulation utilities.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Resolve a path to an absolute, normalized path.
///
/// If `fs::canonicalize` succeeds (path exists), it is used to resolve symlinks
/// and normalize components.
///
/// If it fails (e.g. path does not exist), the path is made absolute relative
/// to CWD and `..`/`.` components are resolved syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    // Try filesystem resolution first (handles symlinks).
    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    // Fallback: syntactic normalization.
    normalize_syntactic(&absolute)
}

/// The user's home directory, or `/tmp` when `HOME` is unset.
///
/// Config defaults (cache root, report directory, state files) all hang off
/// this; the `/tmp` fallback keeps a HOME-less environment functional.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
}

/// Expand a leading `~`/`~/` to the home directory.
///
/// Any other path is returned unchanged; `~user` forms are not supported.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if raw == "~" {
        return home_dir();
    }
    raw.strip_prefix("~/")
        .map_or_else(|| path.to_path_buf(), |rest| home_dir().join(rest))
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
