//! `mbuild scan` command

use std::sync::Arc;

use anyhow::Result;

use crate::cli::{Cli, ScanArgs};
use mbuild::builder::CancelToken;
use mbuild::ops::{load_profiles, scan, ScanOptions};
use mbuild::util::shell::Status;
use mbuild::util::Shell;

pub fn execute(cli: &Cli, args: &ScanArgs, shell: Arc<Shell>) -> Result<()> {
    let (ws, config) = super::load_workspace(cli)?;

    if args.list {
        let profiles = load_profiles(&config, ws.root())?;
        for profile in profiles.iter() {
            let scope = profile
                .scope
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<20} scope: {:<8} providers: {}",
                profile.id,
                scope,
                profile.provider_ids().join(", ")
            );
        }
        return Ok(());
    }

    let opts = ScanOptions {
        profile: args.profile.clone(),
        log: args.log.clone(),
        projects: args.projects.clone(),
        skip_providers: args.no_providers,
    };

    shell.status(
        Status::Scanning,
        format!(
            "{} with profile `{}`",
            ws.name(),
            opts.profile.as_deref().unwrap_or_else(|| config.scanner_profile())
        ),
    );
    match scan(&ws, &config, &opts, CancelToken::new())? {
        Some(results) => println!("{}", serde_json::to_string_pretty(&results)?),
        None => shell.warn("scan cancelled"),
    }
    Ok(())
}
