//! `mbuild plan` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::{Cli, PlanArgs};
use mbuild::ops::{format_plan, plan, PlanOptions};
use mbuild::util::Shell;

pub fn execute(cli: &Cli, args: &PlanArgs, shell: Arc<Shell>) -> Result<()> {
    let (ws, config) = super::load_workspace(cli)?;

    let opts = PlanOptions {
        kind: args.kind,
        selectors: args.selectors.clone(),
        check_resource_changes: args.no_resource_checks.then_some(false),
    };
    let entries = plan(&ws, &config, &opts)?;

    if shell.is_json() {
        for entry in &entries {
            println!("{}", serde_json::to_string(entry)?);
        }
    } else {
        print!("{}", format_plan(&entries));
    }
    Ok(())
}
