//! `mbuild clean` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::{Cli, CleanArgs};
use mbuild::ops::{clean, CleanOptions};
use mbuild::util::Shell;

pub fn execute(cli: &Cli, args: &CleanArgs, shell: Arc<Shell>) -> Result<()> {
    let (ws, config) = super::load_workspace(cli)?;

    let opts = CleanOptions {
        selectors: args.selectors.clone(),
        jobs: args.jobs,
    };
    clean(&ws, &config, shell, &opts)?;
    Ok(())
}
