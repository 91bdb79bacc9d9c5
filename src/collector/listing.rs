//! Normalizers for the build tool's dependency-listing output.
//!
//! The text format is an unstable external protocol: log-level prefixes,
//! tree-drawing characters, trailing annotations, and token arity all vary
//! across tool versions and plugins. Two dialects are handled:
//!
//! - **list** (`dependency:list`): one resolved artifact per line,
//!   `group:artifact:type:version:scope`, indented under a header.
//! - **tree** (`dependency:tree`): indented tree with `+-`/`\-`/`|` (or
//!   box-drawing) connectors and optional trailing parentheticals like
//!   `(optional)` or `(scope not updated)`.
//!
//! Both normalizers keep only well-formed coordinates; placeholder
//! (`${...}`) and range (`[`, `(`) versions never survive.

#![allow(missing_docs)]

use std::sync::OnceLock;

use regex::Regex;

use crate::scanner::codec::{self, ArtifactCoordinate};

fn log_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[(?:INFO|WARNING|ERROR|DEBUG|TRACE)\]\s?").expect("valid regex"))
}

/// Parse `dependency:list` output: strict line-oriented normalizer.
#[must_use]
pub fn parse_list_output(raw: &str) -> Vec<ArtifactCoordinate> {
    let mut out = Vec::new();
    for line in raw.lines() {
        let line = log_prefix_re().replace(line.trim_end_matches('\r'), "");
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        // First whitespace-delimited token; the rest is annotation
        // (`-- module foo [auto]` and friends).
        let Some(token) = trimmed.split_whitespace().next() else {
            continue;
        };
        if let Some(coordinate) = coordinate_from_token(token) {
            out.push(coordinate);
        }
    }
    out
}

/// Parse `dependency:tree` output: tree-indentation-aware, tolerant of
/// trailing parenthetical scope/classifier annotations.
#[must_use]
pub fn parse_tree_output(raw: &str) -> Vec<ArtifactCoordinate> {
    let mut out = Vec::new();
    for line in raw.lines() {
        let line = log_prefix_re().replace(line.trim_end_matches('\r'), "");
        let stripped = strip_tree_connectors(&line);
        let stripped = strip_trailing_parenthetical(stripped).trim();
        if stripped.is_empty() {
            continue;
        }
        let Some(token) = stripped.split_whitespace().next() else {
            continue;
        };
        if let Some(coordinate) = coordinate_from_token(token) {
            out.push(coordinate);
        }
    }
    out
}

/// Extract a coordinate from one `:`-separated token.
///
/// Accepted arities:
/// - 3: `group:artifact:version`
/// - 4: `group:artifact:type:version`
/// - 5: `group:artifact:type:version:scope`
/// - 6: `group:artifact:type:classifier:version:scope`
fn coordinate_from_token(token: &str) -> Option<ArtifactCoordinate> {
    let parts: Vec<&str> = token.split(':').collect();
    let (group, artifact, version) = match parts.len() {
        3 => (parts[0], parts[1], parts[2]),
        4 => (parts[0], parts[1], parts[3]),
        5 => (parts[0], parts[1], parts[3]),
        6 => (parts[0], parts[1], parts[4]),
        _ => return None,
    };
    if !codec::is_valid_segment(group)
        || !codec::is_valid_segment(artifact)
        || !codec::is_valid_segment(version)
    {
        return None;
    }
    ArtifactCoordinate::new(group, artifact, version).ok()
}

fn strip_tree_connectors(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        matches!(c, '+' | '-' | '\\' | '|' | '`' | ' ' | '├' | '─' | '└' | '│')
    })
}

fn strip_trailing_parenthetical(line: &str) -> &str {
    let trimmed = line.trim_end();
    if trimmed.ends_with(')')
        && let Some(idx) = trimmed.rfind(" (")
    {
        return &trimmed[..idx];
    }
    trimmed
}
