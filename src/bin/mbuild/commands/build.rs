//! `mbuild build` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::{BuildArgs, Cli};
use mbuild::core::BuildKind;
use mbuild::ops::{build, BuildOptions, SessionOverrides};
use mbuild::util::Shell;

pub fn execute(cli: &Cli, args: &BuildArgs, shell: Arc<Shell>) -> Result<()> {
    let (ws, config) = super::load_workspace(cli)?;

    let kind = if args.full { BuildKind::Full } else { args.kind };
    if kind == BuildKind::Clean {
        anyhow::bail!("use `mbuild clean` to clean configurations");
    }

    let opts = BuildOptions {
        kind,
        selectors: args.selectors.clone(),
        jobs: args.jobs,
        overrides: SessionOverrides {
            verbose: cli.verbose.then_some(true),
            check_resource_changes: args.no_resource_checks.then_some(false),
        },
    };

    build(&ws, &config, shell, &opts)?;
    Ok(())
}
