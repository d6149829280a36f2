//! Configuration file support for mbuild.
//!
//! Two configuration file locations are read:
//! - Global: `~/.mbuild/config.toml` - user-wide defaults
//! - Workspace: `<workspace>/.mbuild/config.toml` - workspace overrides
//!
//! Workspace config takes precedence over global config, and command line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// File names that describe a project rather than feed its build.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &["Mbuild.toml"];

/// Glob patterns for generated files inside project trees.
pub const DEFAULT_DERIVED_PATTERNS: &[&str] = &["**/*.o", "**/*.obj", "**/*.d"];

/// Default scanner discovery profile.
pub const DEFAULT_SCANNER_PROFILE: &str = "gcc-per-project";

/// mbuild configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Scanner discovery settings
    pub scanner: ScannerConfig,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Trace build decisions
    pub verbose: Option<bool>,

    /// When false every managed configuration builds regardless of changes
    pub check_resource_changes: Option<bool>,

    /// Number of projects built in parallel (None = rayon default)
    pub jobs: Option<usize>,

    /// Project metadata file names ignored by change detection
    pub reserved_names: Option<Vec<String>>,

    /// Glob patterns marking files as derived
    pub derived: Option<Vec<String>>,
}

/// Scanner discovery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScannerConfig {
    /// Profile id used by `mbuild scan`
    pub profile: Option<String>,

    /// Extra profile definitions (TOML)
    pub profiles_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.verbose.is_some() {
            self.build.verbose = other.build.verbose;
        }
        if other.build.check_resource_changes.is_some() {
            self.build.check_resource_changes = other.build.check_resource_changes;
        }
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.reserved_names.is_some() {
            self.build.reserved_names = other.build.reserved_names;
        }
        if other.build.derived.is_some() {
            self.build.derived = other.build.derived;
        }

        if other.scanner.profile.is_some() {
            self.scanner.profile = other.scanner.profile;
        }
        if other.scanner.profiles_file.is_some() {
            self.scanner.profiles_file = other.scanner.profiles_file;
        }
    }

    pub fn verbose(&self) -> bool {
        self.build.verbose.unwrap_or(false)
    }

    pub fn check_resource_changes(&self) -> bool {
        self.build.check_resource_changes.unwrap_or(true)
    }

    /// Reserved project metadata names, falling back to the defaults.
    pub fn reserved_names(&self) -> Vec<String> {
        match &self.build.reserved_names {
            Some(names) => names.clone(),
            None => DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Derived-file glob patterns, falling back to the defaults.
    pub fn derived_patterns(&self) -> Vec<String> {
        match &self.build.derived {
            Some(patterns) => patterns.clone(),
            None => DEFAULT_DERIVED_PATTERNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn scanner_profile(&self) -> &str {
        self.scanner
            .profile
            .as_deref()
            .unwrap_or(DEFAULT_SCANNER_PROFILE)
    }
}

/// Load merged configuration from global and workspace locations.
///
/// Order of precedence (highest to lowest):
/// 1. Workspace config (.mbuild/config.toml)
/// 2. Global config (~/.mbuild/config.toml)
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, workspace_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global) = global_path {
        if global.exists() {
            config.merge(Config::load_or_default(global));
        }
    }

    if workspace_path.exists() {
        config.merge(Config::load_or_default(workspace_path));
    }

    config
}

/// Get the global mbuild config directory (~/.mbuild).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".mbuild"))
}

/// Get the global config path (~/.mbuild/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}
