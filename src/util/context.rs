//! Global context for mbuild operations.
//!
//! Provides centralized access to the working directory and the
//! configuration locations derived from it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::workspace::find_manifest;
use crate::util::config::{global_config_path, load_config, Config};

/// Name of the per-workspace state directory.
pub const STATE_DIR_NAME: &str = ".mbuild";

/// Global context shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Explicit manifest path (`--manifest-path`)
    manifest_path: Option<PathBuf>,
}

impl GlobalContext {
    /// Create a context rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(GlobalContext {
            cwd,
            manifest_path: None,
        })
    }

    /// Create a context rooted at an explicit directory.
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        GlobalContext {
            cwd: cwd.into(),
            manifest_path: None,
        }
    }

    /// Use an explicit manifest instead of searching for one.
    pub fn with_manifest_path(mut self, path: Option<PathBuf>) -> Self {
        self.manifest_path = path.map(|p| {
            if p.is_absolute() {
                p
            } else {
                self.cwd.join(p)
            }
        });
        self
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Locate the workspace manifest.
    pub fn find_manifest(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.manifest_path {
            return Ok(path.clone());
        }
        Ok(find_manifest(&self.cwd)?)
    }

    /// Load global + workspace configuration for the workspace at `root`.
    pub fn load_config(&self, workspace_root: &Path) -> Config {
        let workspace_config = workspace_root.join(STATE_DIR_NAME).join("config.toml");
        load_config(global_config_path().as_deref(), &workspace_config)
    }
}
