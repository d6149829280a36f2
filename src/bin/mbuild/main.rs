//! mbuild CLI - incremental builds for managed C/C++ workspaces

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use mbuild::util::Shell;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("mbuild=debug")
    } else {
        EnvFilter::new("mbuild=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let shell = Arc::new(Shell::from_flags(
        cli.quiet,
        cli.verbose,
        cli.color,
        cli.is_json(),
    ));

    match cli.command {
        Commands::Build(ref args) => commands::build::execute(&cli, args, shell),
        Commands::Clean(ref args) => commands::clean::execute(&cli, args, shell),
        Commands::Plan(ref args) => commands::plan::execute(&cli, args, shell),
        Commands::Scan(ref args) => commands::scan::execute(&cli, args, shell),
        Commands::Completions(ref args) => commands::completions::execute(args),
    }
}
