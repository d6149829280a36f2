//! Environment for builder and generator processes.

use std::collections::BTreeMap;

use crate::core::BuildConfiguration;
use crate::util::process::ProcessBuilder;

pub const ENV_PROJECT: &str = "MBUILD_PROJECT";
pub const ENV_CONFIGURATION: &str = "MBUILD_CONFIGURATION";
pub const ENV_BUILD_DIR: &str = "MBUILD_BUILD_DIR";
pub const ENV_REGENERATE: &str = "MBUILD_REGENERATE";
pub const ENV_CHANGED: &str = "MBUILD_CHANGED";

/// Layered process environment.
///
/// Child processes inherit the current process environment; on top of it
/// come the workspace `[env]` table, the configuration's own `env`, and the
/// `MBUILD_*` variables describing the configuration. Values are passed
/// through verbatim.
#[derive(Debug, Clone, Default)]
pub struct BuildEnvironment {
    workspace: BTreeMap<String, String>,
}

impl BuildEnvironment {
    pub fn new(workspace: BTreeMap<String, String>) -> Self {
        BuildEnvironment { workspace }
    }

    /// Variables set for `cfg`, later layers winning.
    pub fn vars_for(&self, cfg: &BuildConfiguration) -> BTreeMap<String, String> {
        let mut vars = self.workspace.clone();
        vars.extend(cfg.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.insert(ENV_PROJECT.to_string(), cfg.project().to_string());
        vars.insert(ENV_CONFIGURATION.to_string(), cfg.id.name().to_string());
        vars.insert(
            ENV_BUILD_DIR.to_string(),
            cfg.build_dir.to_string_lossy().into_owned(),
        );
        vars
    }

    /// A process for `argv`, run in the project root with this environment.
    pub fn command(
        &self,
        cfg: &BuildConfiguration,
        argv: &[String],
    ) -> anyhow::Result<ProcessBuilder> {
        Ok(ProcessBuilder::from_argv(argv)?
            .cwd(&cfg.project_root)
            .envs(&self.vars_for(cfg)))
    }
}
