//! Engine configuration, loaded from TOML with per-field defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which implementation parses brace-language files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BraceBackend {
    #[default]
    InProcess,
    /// A long-lived child process speaking the worker protocol.
    Worker,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BraceParserConfig {
    pub backend: BraceBackend,
    /// Program and arguments used to spawn the worker.
    pub command: Vec<String>,
    /// Upper bound on a single worker response.
    pub timeout_ms: u64,
}

impl Default for BraceParserConfig {
    fn default() -> Self {
        BraceParserConfig {
            backend: BraceBackend::InProcess,
            command: vec!["depgraph".to_string(), "parse-worker".to_string()],
            timeout_ms: 30_000,
        }
    }
}

/// Directory names skipped while walking a project.
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    ".venv",
    "venv",
    ".tox",
    "dist",
    "build",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "env",
    ".env",
    "site-packages",
    ".idea",
    ".vscode",
    "coverage",
    ".coverage",
    "htmlcov",
    ".eggs",
    "*.egg-info",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Case-insensitive substrings that mark a file as a test.
    pub test_indicators: Vec<String>,
    /// Glob patterns matched against directory names.
    pub skip_dirs: Vec<String>,
    /// Parser threads; 0 picks the available parallelism.
    pub parse_threads: usize,
    pub max_cycle_warnings: usize,
    pub brace_parser: BraceParserConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            test_indicators: vec!["test".to_string()],
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|d| d.to_string()).collect(),
            parse_threads: 0,
            max_cycle_warnings: 10,
            brace_parser: BraceParserConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading engine config from {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolved parser thread count.
    pub fn threads(&self) -> usize {
        if self.parse_threads > 0 {
            return self.parse_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }
}
