//! Command-backed build-file generator.
//!
//! A managed configuration names a `generate` command that writes the build
//! files its builder consumes, and optionally a `dependencies` command that
//! refreshes dependency files after a build. Both run in the project root
//! with the build environment; `MBUILD_REGENERATE` tells them whether to
//! start from scratch and `MBUILD_CHANGED` lists the changed paths of an
//! incremental generation, one per line.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::builder::collaborators::{
    BuildFileGenerator, GeneratorProvider, MultiResult, Severity, StatusCode,
};
use crate::builder::environment::{BuildEnvironment, ENV_CHANGED, ENV_REGENERATE};
use crate::core::{BuildConfiguration, ChangeKind, ChangeSet};
use crate::util::fs;

/// Object and dependency files a removed source leaves behind.
const STALE_OUTPUT_EXTENSIONS: &[&str] = &["o", "obj", "d"];

pub struct CommandGenerator {
    env: Arc<BuildEnvironment>,
}

impl CommandGenerator {
    pub fn new(env: Arc<BuildEnvironment>) -> Self {
        CommandGenerator { env }
    }

    fn has_sources(cfg: &BuildConfiguration) -> bool {
        cfg.sources.iter().any(|s| s.is_dir())
    }

    fn generate(&self, cfg: &BuildConfiguration, regenerate: bool, changed: &str) -> MultiResult {
        if !Self::has_sources(cfg) {
            return MultiResult::warning(
                StatusCode::NoSourceFolders,
                format!("`{}` has no source folders to generate from", cfg.id),
            );
        }

        let run = || -> Result<()> {
            self.env
                .command(cfg, &cfg.builder.generate)?
                .env(ENV_REGENERATE, if regenerate { "1" } else { "0" })
                .env(ENV_CHANGED, changed)
                .exec_and_check()?;
            Ok(())
        };

        match run() {
            Ok(()) => MultiResult::ok().with(
                Severity::Info,
                StatusCode::Other,
                format!(
                    "{} build files for `{}`",
                    if regenerate { "regenerated" } else { "updated" },
                    cfg.id
                ),
            ),
            Err(e) => MultiResult::error(
                StatusCode::GenerationFailed,
                format!("failed to generate build files for `{}`: {:#}", cfg.id, e),
            ),
        }
    }

    fn run_dependencies(&self, cfg: &BuildConfiguration, regenerate: bool) -> Result<()> {
        if cfg.builder.dependencies.is_empty() {
            return Ok(());
        }
        self.env
            .command(cfg, &cfg.builder.dependencies)?
            .env(ENV_REGENERATE, if regenerate { "1" } else { "0" })
            .exec_and_check()
            .with_context(|| format!("failed to generate dependencies for `{}`", cfg.id))?;
        Ok(())
    }

    fn remove_stale_outputs(cfg: &BuildConfiguration, source: &Path) -> Result<()> {
        let Some(stem) = source.file_stem() else {
            return Ok(());
        };
        let dir = source
            .parent()
            .map_or_else(|| cfg.build_dir.clone(), |p| cfg.build_dir.join(p));
        for ext in STALE_OUTPUT_EXTENSIONS {
            let stale = dir.join(format!("{}.{}", stem.to_string_lossy(), ext));
            if fs::remove_file_if_exists(&stale)? {
                tracing::debug!("removed stale {}", stale.display());
            }
        }
        Ok(())
    }
}

impl BuildFileGenerator for CommandGenerator {
    fn analyze_impact(&self, cfg: &BuildConfiguration, changes: Option<&ChangeSet>) -> Result<()> {
        let Some(changes) = changes.filter(|c| !c.is_unknown()) else {
            return Ok(());
        };
        if cfg.build_dir.exists() && !cfg.build_dir.is_dir() {
            bail!(
                "build directory `{}` is not a directory",
                cfg.build_dir.display()
            );
        }

        for record in changes.records() {
            if record.kind == ChangeKind::Removed && !record.is_derived {
                Self::remove_stale_outputs(cfg, &record.path)?;
            }
        }
        Ok(())
    }

    fn regenerate_all(&self, cfg: &BuildConfiguration) -> MultiResult {
        self.generate(cfg, true, "")
    }

    fn generate_incremental(&self, cfg: &BuildConfiguration, changes: &ChangeSet) -> MultiResult {
        let changed = changes
            .sorted_records()
            .iter()
            .filter(|r| !r.is_derived && !r.is_project_metadata)
            .map(|r| r.path.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        self.generate(cfg, false, &changed)
    }

    fn regenerate_dependencies(&self, cfg: &BuildConfiguration, full: bool) -> Result<()> {
        self.run_dependencies(cfg, full)
    }

    fn generate_dependencies(&self, cfg: &BuildConfiguration) -> Result<()> {
        self.run_dependencies(cfg, false)
    }
}

/// Hands out a [`CommandGenerator`] to configurations that declare a
/// `generate` command.
pub struct CommandGeneratorProvider {
    env: Arc<BuildEnvironment>,
}

impl CommandGeneratorProvider {
    pub fn new(env: Arc<BuildEnvironment>) -> Self {
        CommandGeneratorProvider { env }
    }
}

impl GeneratorProvider for CommandGeneratorProvider {
    fn generator_for(&self, cfg: &BuildConfiguration) -> Option<Box<dyn BuildFileGenerator>> {
        if cfg.builder.generate.is_empty() {
            return None;
        }
        Some(Box::new(CommandGenerator::new(self.env.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BaselineId, ChangeRecord, ConfigId};
    use tempfile::TempDir;

    fn cfg(tmp: &TempDir, script: &str) -> BuildConfiguration {
        let mut cfg = BuildConfiguration::new(ConfigId::new("app", "Debug"), tmp.path());
        cfg.sources = vec![tmp.path().join("src")];
        cfg.builder.generate = vec!["sh".into(), "-c".into(), script.into()];
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        cfg
    }

    fn generator() -> CommandGenerator {
        CommandGenerator::new(Arc::new(BuildEnvironment::default()))
    }

    #[test]
    fn test_regenerate_all_passes_flag() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp, "echo $MBUILD_REGENERATE > gen.txt");

        let result = generator().regenerate_all(&cfg);
        assert_eq!(result.severity(), Severity::Info);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("gen.txt")).unwrap().trim(),
            "1"
        );
    }

    #[test]
    fn test_incremental_lists_changed_sources() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp, "printf '%s' \"$MBUILD_CHANGED\" > changed.txt");
        let changes = ChangeSet::since(BaselineId(3))
            .with(ChangeRecord::new("src/b.c", ChangeKind::Modified))
            .with(ChangeRecord::new("src/a.o", ChangeKind::Added).derived())
            .with(ChangeRecord::new("src/a.c", ChangeKind::Added));

        generator().generate_incremental(&cfg, &changes);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("changed.txt")).unwrap(),
            "src/a.c\nsrc/b.c"
        );
    }

    #[test]
    fn test_missing_sources_warn() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = cfg(&tmp, "true");
        cfg.sources = vec![tmp.path().join("nope")];

        let result = generator().regenerate_all(&cfg);
        assert_eq!(result.severity(), Severity::Warning);
        assert!(result.has_code(StatusCode::NoSourceFolders));
    }

    #[test]
    fn test_failing_command_is_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp, "echo broken >&2; exit 1");

        let result = generator().regenerate_all(&cfg);
        assert_eq!(result.severity(), Severity::Error);
        assert!(result.message().contains("broken"));
    }

    #[test]
    fn test_analyze_impact_removes_stale_objects() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp, "true");
        let obj_dir = cfg.build_dir.join("src");
        std::fs::create_dir_all(&obj_dir).unwrap();
        std::fs::write(obj_dir.join("gone.o"), "").unwrap();
        std::fs::write(obj_dir.join("kept.o"), "").unwrap();

        let changes = ChangeSet::since(BaselineId(1))
            .with(ChangeRecord::new("src/gone.c", ChangeKind::Removed));
        generator().analyze_impact(&cfg, Some(&changes)).unwrap();

        assert!(!obj_dir.join("gone.o").exists());
        assert!(obj_dir.join("kept.o").exists());
    }

    #[test]
    fn test_provider_requires_generate_command() {
        let provider = CommandGeneratorProvider::new(Arc::new(BuildEnvironment::default()));
        let mut cfg = BuildConfiguration::new(ConfigId::new("app", "Debug"), "/ws/app");
        assert!(provider.generator_for(&cfg).is_none());

        cfg.builder.generate = vec!["./configure.sh".into()];
        assert!(provider.generator_for(&cfg).is_some());
    }
}
