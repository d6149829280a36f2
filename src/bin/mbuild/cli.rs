//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell as CompletionShell;

use mbuild::core::BuildKind;
use mbuild::util::shell::ColorChoice;

/// mbuild - incremental builds for workspaces of managed C/C++ projects
#[derive(Parser)]
#[command(name = "mbuild")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (build decisions and tool output)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Print errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Coloring: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Output format for build messages
    #[arg(long, global = true, default_value = "human", value_parser = ["human", "json"])]
    pub message_format: String,

    /// Path to Mbuild.toml (default: search upwards from the current directory)
    #[arg(long, global = true, env = "MBUILD_MANIFEST")]
    pub manifest_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_json(&self) -> bool {
        self.message_format == "json"
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build configurations that need it
    Build(BuildArgs),

    /// Clean configurations and forget their build state
    Clean(CleanArgs),

    /// Show what a build would do, without building
    Plan(PlanArgs),

    /// Discover include paths and macros from build output
    Scan(ScanArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Configurations to build: `<project>`, `<project>/<configuration>` or
    /// `<configuration>` (default: every default configuration)
    pub selectors: Vec<String>,

    /// Build kind: auto, incremental, full
    #[arg(long, default_value = "auto", conflicts_with = "full")]
    pub kind: BuildKind,

    /// Shorthand for `--kind full`
    #[arg(long)]
    pub full: bool,

    /// Number of projects built in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Build every managed configuration regardless of changes
    #[arg(long)]
    pub no_resource_checks: bool,
}

#[derive(Args)]
pub struct CleanArgs {
    /// Configurations to clean (default: every default configuration)
    pub selectors: Vec<String>,

    /// Number of projects cleaned in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Configurations to plan (default: every default configuration)
    pub selectors: Vec<String>,

    /// Build kind to plan for: auto, incremental, full, clean
    #[arg(long, default_value = "auto")]
    pub kind: BuildKind,

    /// Plan as if resource change checks were disabled
    #[arg(long)]
    pub no_resource_checks: bool,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Projects to scan (default: all)
    pub projects: Vec<String>,

    /// Scanner profile id
    #[arg(long)]
    pub profile: Option<String>,

    /// Build output log to parse
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Only parse build output; don't run or open profile providers
    #[arg(long)]
    pub no_providers: bool,

    /// List available profiles
    #[arg(long)]
    pub list: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: CompletionShell,
}
