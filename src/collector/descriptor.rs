//! Static project-descriptor fallback: regex extraction of declared
//! dependency and plugin coordinates from `pom.xml`.
//!
//! This path runs when the build tool is unavailable, a module listing times
//! out, or transitive resolution is switched off. It is intentionally a
//! shallow syntactic read — no inheritance walking, no profile activation —
//! and an empty result is valid. Blocks nested in `<dependencyManagement>`
//! or `<pluginManagement>` declare constraints, not usage, and are skipped.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::errors::{M2jError, Result};
use crate::scanner::codec::{self, ArtifactCoordinate};

/// Group assumed for `<plugin>` entries that omit `<groupId>`.
const DEFAULT_PLUGIN_GROUP: &str = "org.apache.maven.plugins";

/// Parse a descriptor file into declared dependency/plugin coordinates.
pub fn parse_descriptor(pom_path: &Path) -> Result<Vec<ArtifactCoordinate>> {
    let content = fs::read_to_string(pom_path).map_err(|source| M2jError::Io {
        path: pom_path.to_path_buf(),
        source,
    })?;
    Ok(parse_descriptor_text(&content))
}

/// Parse descriptor text. See module docs for what is (not) resolved.
#[must_use]
pub fn parse_descriptor_text(content: &str) -> Vec<ArtifactCoordinate> {
    let content = strip_comments(content);
    let properties = collect_properties(&content);

    let dep_mgmt_spans = block_spans(&content, "dependencyManagement");
    let plugin_mgmt_spans = block_spans(&content, "pluginManagement");

    let mut out = Vec::new();

    for (span, block) in blocks(&content, "dependency") {
        if within_any(span.start, &dep_mgmt_spans) {
            continue;
        }
        if let Some(coordinate) = coordinate_from_block(block, None, &properties) {
            out.push(coordinate);
        }
    }

    for (span, block) in blocks(&content, "plugin") {
        if within_any(span.start, &plugin_mgmt_spans) {
            continue;
        }
        if let Some(coordinate) =
            coordinate_from_block(block, Some(DEFAULT_PLUGIN_GROUP), &properties)
        {
            out.push(coordinate);
        }
    }

    out
}

/// Build a coordinate from one dependency/plugin block body.
///
/// `default_group` covers the plugin shorthand that omits `<groupId>`.
/// Versionless blocks (managed elsewhere) and unresolved placeholders yield
/// `None`.
fn coordinate_from_block(
    block: &str,
    default_group: Option<&str>,
    properties: &HashMap<String, String>,
) -> Option<ArtifactCoordinate> {
    let group = child_tag(block, "groupId")
        .map(|g| resolve_placeholders(&g, properties))
        .or_else(|| default_group.map(ToString::to_string))?;
    let artifact = resolve_placeholders(&child_tag(block, "artifactId")?, properties);
    let version = resolve_placeholders(&child_tag(block, "version")?, properties);

    if !codec::is_valid_segment(&group)
        || !codec::is_valid_segment(&artifact)
        || !codec::is_valid_segment(&version)
    {
        return None;
    }
    ArtifactCoordinate::new(&group, &artifact, &version).ok()
}

/// Property table: `<properties>` children plus `project.*` synthetics
/// derived from the descriptor's own (or parent's) GAV.
fn collect_properties(content: &str) -> HashMap<String, String> {
    let mut properties = HashMap::new();

    if let Some((_, body)) = blocks(content, "properties").into_iter().next() {
        for cap in property_re().captures_iter(body) {
            properties.insert(cap[1].to_string(), cap[2].trim().to_string());
        }
    }

    let parent_spans = block_spans(content, "parent");
    let parent_block = blocks(content, "parent").into_iter().next().map(|(_, b)| b);

    for tag in ["groupId", "artifactId", "version"] {
        let own = top_level_tag(content, tag, &parent_spans);
        let inherited = parent_block.and_then(|b| child_tag(b, tag));
        if let Some(value) = own.or(inherited) {
            properties.insert(format!("project.{tag}"), value.clone());
            properties.insert(format!("pom.{tag}"), value);
        }
    }

    properties
}

/// First occurrence of `<tag>` outside the parent block and outside any
/// dependency/plugin/build machinery.
fn top_level_tag(content: &str, tag: &str, parent_spans: &[Range<usize>]) -> Option<String> {
    let mut excluded: Vec<Range<usize>> = parent_spans.to_vec();
    for outer in ["dependencies", "build", "profiles", "reporting"] {
        excluded.extend(block_spans(content, outer));
    }

    let re = tag_re(tag);
    re.captures_iter(content)
        .find(|cap| {
            let start = cap.get(0).map_or(0, |m| m.start());
            !within_any(start, &excluded)
        })
        .map(|cap| cap[1].trim().to_string())
}

fn child_tag(block: &str, tag: &str) -> Option<String> {
    tag_re(tag)
        .captures(block)
        .map(|cap| cap[1].trim().to_string())
}

/// Substitute `${name}` references from the property table. A single pass —
/// chained property indirection is beyond the fallback's contract.
fn resolve_placeholders(value: &str, properties: &HashMap<String, String>) -> String {
    placeholder_re()
        .replace_all(value, |cap: &regex::Captures<'_>| {
            properties
                .get(&cap[1])
                .cloned()
                .unwrap_or_else(|| cap[0].to_string())
        })
        .into_owned()
}

// ──────────────────── regex plumbing ────────────────────

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([A-Za-z0-9_.-]+)>([^<]*)</([A-Za-z0-9_.-]+)>").expect("valid regex"))
}

fn tag_re(tag: &str) -> Regex {
    Regex::new(&format!(r"<{tag}>\s*([^<]*?)\s*</{tag}>")).expect("valid regex")
}

fn strip_comments(content: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"))
        .replace_all(content, "")
        .into_owned()
}

fn block_spans(content: &str, tag: &str) -> Vec<Range<usize>> {
    let re = Regex::new(&format!(r"(?s)<{tag}\b[^>]*>.*?</{tag}>")).expect("valid regex");
    re.find_iter(content).map(|m| m.range()).collect()
}

fn blocks<'a>(content: &'a str, tag: &str) -> Vec<(Range<usize>, &'a str)> {
    let re = Regex::new(&format!(r"(?s)<{tag}\b[^>]*>(.*?)</{tag}>")).expect("valid regex");
    re.captures_iter(content)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let body = cap.get(1)?;
            Some((whole.range(), body.as_str()))
        })
        .collect()
}

fn within_any(offset: usize, spans: &[Range<usize>]) -> bool {
    spans.iter().any(|span| span.contains(&offset))
}

// ──────────────────── tests ────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn names(coords: &[ArtifactCoordinate]) -> Vec<String> {
        coords.iter().map(ToString::to_string).collect()
    }

    const POM: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>com.example</groupId>
    <artifactId>parent</artifactId>
    <version>2.5.0</version>
  </parent>
  <artifactId>myapp</artifactId>

  <properties>
    <commons.version>3.12.0</commons.version>
    <junit.version>4.13.2</junit.version>
  </properties>

  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.managed</groupId>
        <artifactId>managed-only</artifactId>
        <version>9.9.9</version>
      </dependency>
    </dependencies>
  </dependencyManagement>

  <dependencies>
    <dependency>
      <groupId>org.apache.commons</groupId>
      <artifactId>commons-lang3</artifactId>
      <version>${commons.version}</version>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>${junit.version}</version>
      <scope>test</scope>
    </dependency>
    <dependency>
      <groupId>com.example</groupId>
      <artifactId>sibling</artifactId>
      <version>${project.version}</version>
    </dependency>
    <dependency>
      <groupId>org.versionless</groupId>
      <artifactId>from-bom</artifactId>
    </dependency>
  </dependencies>

  <build>
    <pluginManagement>
      <plugins>
        <plugin>
          <artifactId>maven-surefire-plugin</artifactId>
          <version>3.1.2</version>
        </plugin>
      </plugins>
    </pluginManagement>
    <plugins>
      <plugin>
        <artifactId>maven-clean-plugin</artifactId>
        <version>3.2.0</version>
      </plugin>
      <plugin>
        <groupId>org.codehaus.mojo</groupId>
        <artifactId>exec-maven-plugin</artifactId>
        <version>3.1.0</version>
      </plugin>
    </plugins>
  </build>
</project>
"#;

    #[test]
    fn parses_declared_dependencies_with_placeholders() {
        let coords = parse_descriptor_text(POM);
        let got = names(&coords);
        assert!(got.contains(&"org.apache.commons:commons-lang3:3.12.0".to_string()));
        assert!(got.contains(&"junit:junit:4.13.2".to_string()));
    }

    #[test]
    fn project_version_inherited_from_parent() {
        let coords = parse_descriptor_text(POM);
        assert!(names(&coords).contains(&"com.example:sibling:2.5.0".to_string()));
    }

    #[test]
    fn managed_blocks_are_skipped() {
        let coords = parse_descriptor_text(POM);
        let got = names(&coords);
        assert!(!got.iter().any(|c| c.contains("managed-only")));
        assert!(!got.iter().any(|c| c.contains("maven-surefire-plugin")));
    }

    #[test]
    fn versionless_dependency_is_skipped() {
        let coords = parse_descriptor_text(POM);
        assert!(!names(&coords).iter().any(|c| c.contains("from-bom")));
    }

    #[test]
    fn plugins_get_default_group_when_omitted() {
        let coords = parse_descriptor_text(POM);
        let got = names(&coords);
        assert!(got.contains(&"org.apache.maven.plugins:maven-clean-plugin:3.2.0".to_string()));
        assert!(got.contains(&"org.codehaus.mojo:exec-maven-plugin:3.1.0".to_string()));
    }

    #[test]
    fn commented_out_dependencies_are_ignored() {
        let pom = r"<project>
  <dependencies>
    <!--
    <dependency>
      <groupId>org.dead</groupId>
      <artifactId>commented</artifactId>
      <version>1.0</version>
    </dependency>
    -->
    <dependency>
      <groupId>org.live</groupId>
      <artifactId>real</artifactId>
      <version>2.0</version>
    </dependency>
  </dependencies>
</project>";
        let coords = parse_descriptor_text(pom);
        assert_eq!(names(&coords), vec!["org.live:real:2.0"]);
    }

    #[test]
    fn unresolved_placeholder_versions_are_skipped() {
        let pom = r"<project>
  <dependencies>
    <dependency>
      <groupId>org.foo</groupId>
      <artifactId>bar</artifactId>
      <version>${undefined.property}</version>
    </dependency>
  </dependencies>
</project>";
        assert!(parse_descriptor_text(pom).is_empty());
    }

    #[test]
    fn empty_descriptor_yields_empty_set() {
        assert!(parse_descriptor_text("<project/>").is_empty());
        assert!(parse_descriptor_text("").is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = parse_descriptor(Path::new("/no/such/pom.xml")).unwrap_err();
        assert_eq!(err.code(), "M2J-3002");
    }

    #[test]
    fn parse_descriptor_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let pom = dir.path().join("pom.xml");
        fs::write(&pom, POM).unwrap();
        let coords = parse_descriptor(&pom).unwrap();
        assert!(!coords.is_empty());
    }
}
