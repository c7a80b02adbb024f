//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;
use crate::discovery::DiscoveryRule;
use crate::runner::RunnerConfig;

/// Default number of specs running at once
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Where and how specs are found
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,

    /// External test runner settings
    #[serde(default)]
    pub runner: RunnerSection,
}

/// Spec discovery settings
#[derive(Debug, Deserialize)]
pub struct DiscoveryConfig {
    /// Directory containing the spec files
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// File name prefix marking a spec
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Spec always dispatched first, if present
    #[serde(default = "default_smoke")]
    pub smoke: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            prefix: default_prefix(),
            smoke: default_smoke(),
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from("nmclicktests")
}
fn default_prefix() -> String {
    "spec.".to_string()
}
fn default_smoke() -> Option<String> {
    Some("spec.generic.js".to_string())
}

/// Worker pool settings
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of specs running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Test runner settings
#[derive(Debug, Deserialize)]
pub struct RunnerSection {
    /// Runner executable, a path or a command name looked up on PATH
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Extra arguments placed before the spec path
    #[serde(default)]
    pub args: Vec<String>,

    /// Maximum runtime of one spec, also forwarded to the runner
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Stop a spec at its first failing assertion
    #[serde(default = "default_bail")]
    pub bail: bool,

    /// Buffered output ceiling per spec
    #[serde(default = "default_max_output")]
    pub max_output_mb: usize,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            timeout_secs: default_timeout(),
            bail: default_bail(),
            max_output_mb: default_max_output(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("./node_modules/mocha/bin/mocha")
}
fn default_timeout() -> u64 {
    20
}
fn default_bail() -> bool {
    true
}
fn default_max_output() -> usize {
    10
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Discovery rule described by this configuration
    pub fn discovery_rule(&self) -> DiscoveryRule {
        DiscoveryRule {
            prefix: self.discovery.prefix.clone(),
            smoke: self.discovery.smoke.clone(),
        }
    }

    /// Process runner settings described by this configuration
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            program: self.runner.program.clone(),
            args: self.runner.args.clone(),
            timeout: Duration::from_secs(self.runner.timeout_secs),
            bail: self.runner.bail,
            max_output_bytes: self.runner.max_output_mb.saturating_mul(1024 * 1024),
        }
    }
}
