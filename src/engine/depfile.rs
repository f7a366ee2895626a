//! Compiler-written dependency listings
//!
//! Two sidecar formats are understood:
//! - GNU make depfiles, as written by `clang`/`gcc` with `-MMD -MF <file>`
//! - MSVC `/sourceDependencies` JSON documents (`Data.Includes`)
//!
//! [`DepfileHandler`] plugs either one into the staleness tracker.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::staleness::{modified, DependencyHandler};
use crate::error::DependencyError;

/// Matches the target part of a make rule: "out.o:" (drive letters survive the lazy match)
static RULE_TARGET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?):(?:\s|$)").expect("Invalid regex"));

/// Matches one prerequisite, honouring `\ ` escaped spaces
static PREREQ_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:\\ |\\#|\S)+").expect("Invalid regex"));

/// Format of a dependency listing sidecar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DepfileFormat {
    /// GNU make rule syntax (`-MMD -MF`)
    Make,
    /// MSVC `/sourceDependencies` JSON
    Msvc,
}

/// Parse a GNU make depfile into its prerequisite paths
pub fn parse_make_depfile(content: &str) -> Result<Vec<PathBuf>, String> {
    let joined = content.replace("\\\r\n", " ").replace("\\\n", " ");

    let mut rules = 0;
    let mut prerequisites = Vec::new();
    for line in joined.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let caps = RULE_TARGET_RE
            .captures(line)
            .ok_or_else(|| format!("expected a make rule, found '{}'", line))?;
        rules += 1;
        let after = &line[caps.get(0).map(|m| m.end()).unwrap_or(line.len())..];
        for token in PREREQ_RE.find_iter(after) {
            let unescaped = token
                .as_str()
                .replace("\\ ", " ")
                .replace("\\#", "#")
                .replace("$$", "$");
            prerequisites.push(PathBuf::from(unescaped));
        }
    }

    if rules == 0 {
        return Err("no rules found".to_string());
    }
    Ok(prerequisites)
}

#[derive(Deserialize)]
struct SourceDependencies {
    #[serde(rename = "Data")]
    data: SourceDependencyData,
}

#[derive(Deserialize)]
struct SourceDependencyData {
    #[serde(rename = "Includes", default)]
    includes: Vec<PathBuf>,
}

/// Parse an MSVC `/sourceDependencies` document into its include paths
pub fn parse_msvc_dependencies(content: &str) -> Result<Vec<PathBuf>, serde_json::Error> {
    let doc: SourceDependencies = serde_json::from_str(content)?;
    Ok(doc.data.includes)
}

/// Read and parse one dependency listing
pub fn read_dependencies(
    path: &Path,
    format: DepfileFormat,
) -> Result<Vec<PathBuf>, DependencyError> {
    let content = std::fs::read_to_string(path)?;
    match format {
        DepfileFormat::Make => {
            parse_make_depfile(&content).map_err(|reason| DependencyError::Malformed {
                path: path.to_path_buf(),
                reason,
            })
        }
        DepfileFormat::Msvc => Ok(parse_msvc_dependencies(&content)?),
    }
}

/// Compares recorded header dependencies against the primary output
///
/// `check_files[object_index]` is the output whose timestamp is the
/// reference; `check_files[depfile_index]` is the listing to read.
/// Relative listed paths are resolved against the base directory (the
/// directory the compiler ran in). Listed paths that no longer exist are
/// skipped.
#[derive(Debug, Clone)]
pub struct DepfileHandler {
    format: DepfileFormat,
    object_index: usize,
    depfile_index: usize,
    base_dir: Option<PathBuf>,
}

impl DepfileHandler {
    /// Object at check file 0, listing at `depfile_index`
    pub fn new(format: DepfileFormat, depfile_index: usize) -> Self {
        Self {
            format,
            object_index: 0,
            depfile_index,
            base_dir: None,
        }
    }

    /// Resolve relative prerequisites against `dir` instead of the process cwd
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, dependency: PathBuf) -> PathBuf {
        match &self.base_dir {
            Some(base) if dependency.is_relative() => base.join(dependency),
            _ => dependency,
        }
    }
}

impl DependencyHandler for DepfileHandler {
    fn is_outdated(&self, item: &Path, check_files: &[PathBuf]) -> Result<bool, DependencyError> {
        let object = check_files
            .get(self.object_index)
            .ok_or(DependencyError::MissingCheckFile {
                index: self.object_index,
            })?;
        let listing = check_files
            .get(self.depfile_index)
            .ok_or(DependencyError::MissingCheckFile {
                index: self.depfile_index,
            })?;

        let object_time = modified(object)?;
        for dependency in read_dependencies(listing, self.format)? {
            let dependency = self.resolve(dependency);
            if !dependency.exists() {
                continue;
            }
            if modified(&dependency)? > object_time {
                tracing::debug!(
                    item = %item.display(),
                    dependency = %dependency.display(),
                    "dependency newer than output"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }
}
