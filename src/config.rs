//! Configuration file schema for rain-rtti.
//!
//! The configuration controls where sources live, which marker class opts
//! types into reflection, and how the generation run reacts to missing
//! caches, conflicting records, and failed extractions.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file names to search for.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["rtti.yaml", ".rtti.yaml"];

/// What to do when a requested cache file does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCachePolicy {
    /// Warn and continue without that file's records.
    #[default]
    Warn,
    /// Abort the run.
    Error,
}

/// What to do when two files produce different records under one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Error,
    /// Keep the record from the file whose path sorts first.
    PreferFirst,
}

/// How base specifiers are matched to registered classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseLookup {
    /// Prefix unqualified spellings with the derived class's scope.
    #[default]
    Heuristic,
    /// Search every enclosing scope and report ambiguity.
    Strict,
}

/// What to do when re-extracting a stale file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Abort,
    /// Leave the file stale, report it, and merge the rest.
    Isolate,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Only declarations under this directory are reflected.
    pub source_root: PathBuf,
    /// Name of the marker base class.
    pub sentinel: String,
    /// Extra directories searched for `#include` targets.
    pub include_dirs: Vec<PathBuf>,
    /// Optional `compile_commands.json` supplying per-file `-I` flags.
    pub compile_commands: Option<PathBuf>,
    /// Header providing the runtime registry.
    pub runtime_header: String,
    /// Namespace the registrations are emitted into.
    pub namespace: String,
    pub on_missing_cache: MissingCachePolicy,
    pub on_duplicate: DuplicatePolicy,
    pub base_lookup: BaseLookup,
    pub on_extract_failure: FailurePolicy,
    /// Treat front-end syntax errors as fatal.
    pub strict_parse: bool,
    /// Glob patterns for sources `scan` skips (e.g. "**/third_party/**").
    pub excluded_paths: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("src"),
            sentinel: "Reflect".to_string(),
            include_dirs: Vec::new(),
            compile_commands: None,
            runtime_header: "rain/rain.h".to_string(),
            namespace: "rain::rtti".to_string(),
            on_missing_cache: MissingCachePolicy::default(),
            on_duplicate: DuplicatePolicy::default(),
            base_lookup: BaseLookup::default(),
            on_extract_failure: FailurePolicy::default(),
            strict_parse: false,
            excluded_paths: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    ///
    /// Relative paths in the file resolve against the file's directory.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::parse_str(&content)?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            config.rebase(dir);
        }
        Ok(config)
    }

    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Look for a config file in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        DEFAULT_CONFIG_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
    }

    fn rebase(&mut self, dir: &Path) {
        let rebase = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                dir.join(p)
            }
        };
        self.source_root = rebase(&self.source_root);
        self.include_dirs = self.include_dirs.iter().map(|p| rebase(p)).collect();
        self.compile_commands = self.compile_commands.as_deref().map(rebase);
    }

    /// Check if a path should be excluded based on excluded_paths patterns.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();

        for pattern in &self.excluded_paths {
            if let Ok(glob) = globset::Glob::new(pattern) {
                let matcher = glob.compile_matcher();
                if matcher.is_match(&*path_str) {
                    return true;
                }
            }
        }
        false
    }
}
