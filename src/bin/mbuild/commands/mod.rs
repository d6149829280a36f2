//! Command implementations

pub mod build;
pub mod clean;
pub mod completions;
pub mod plan;
pub mod scan;

use anyhow::Result;

use crate::cli::Cli;
use mbuild::core::Workspace;
use mbuild::util::{Config, GlobalContext};

/// Load the workspace and its merged configuration.
pub fn load_workspace(cli: &Cli) -> Result<(Workspace, Config)> {
    let ctx = GlobalContext::new()?.with_manifest_path(cli.manifest_path.clone());
    let manifest_path = ctx.find_manifest()?;
    let ws = Workspace::new(&manifest_path)?;
    let config = ctx.load_config(ws.root());
    Ok((ws, config))
}
