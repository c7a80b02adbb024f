//! Spec discovery
//!
//! Lists the spec files of a directory and puts the smoke spec first.

use std::path::{Path, PathBuf};

use crate::common::{Error, Result};

/// One discovered spec file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// File name, used in progress notices and failure logs
    pub name: String,
    /// Full path handed to the test runner
    pub path: PathBuf,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Which directory entries count as specs and which one runs first
#[derive(Debug, Clone)]
pub struct DiscoveryRule {
    /// File name prefix marking a spec
    pub prefix: String,
    /// Name of the smoke spec, moved to the front when present
    pub smoke: Option<String>,
}

impl Default for DiscoveryRule {
    fn default() -> Self {
        Self {
            prefix: "spec.".to_string(),
            smoke: Some("spec.generic.js".to_string()),
        }
    }
}

/// Discover the specs in `source`, in dispatch order
///
/// Entries are sorted by name, then the smoke spec (if any) is moved to the
/// front. An unreadable directory or one without any spec is an error.
pub fn discover(source: &Path, rule: &DiscoveryRule) -> Result<Vec<TaskSpec>> {
    let entries = std::fs::read_dir(source).map_err(|e| Error::discovery(source, &e))?;

    let mut specs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::discovery(source, &e))?;

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            continue;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!(path = %entry.path().display(), "Skipping non UTF-8 file name");
            continue;
        };

        if name.starts_with(&rule.prefix) {
            specs.push(TaskSpec::new(name, entry.path()));
        }
    }

    if specs.is_empty() {
        return Err(Error::no_specs(source));
    }

    specs.sort_by(|a, b| a.name.cmp(&b.name));

    if let Some(smoke) = &rule.smoke {
        prioritize_smoke(&mut specs, smoke);
    }

    tracing::debug!(count = specs.len(), dir = %source.display(), "Discovered specs");
    Ok(specs)
}

/// Move the spec named `smoke` to the front, keeping everything else in order
pub fn prioritize_smoke(specs: &mut Vec<TaskSpec>, smoke: &str) {
    if let Some(index) = specs.iter().position(|s| s.name == smoke) {
        let spec = specs.remove(index);
        specs.insert(0, spec);
    }
}
