//! Command-backed build runner.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::builder::collaborators::{BuildRunner, ConsoleSink, InvokeOutcome};
use crate::builder::environment::BuildEnvironment;
use crate::core::{BuildConfiguration, BuildKind};
use crate::util::fs;

/// Runs the configured `build` / `clean` commands.
pub struct CommandBuildRunner {
    env: Arc<BuildEnvironment>,
}

impl CommandBuildRunner {
    pub fn new(env: Arc<BuildEnvironment>) -> Self {
        CommandBuildRunner { env }
    }

    /// Remove build output when no clean command is configured.
    ///
    /// Refuses to remove a build directory that contains the project root.
    fn remove_outputs(cfg: &BuildConfiguration, console: &dyn ConsoleSink) -> Result<()> {
        let build_dir = fs::normalize(&cfg.build_dir);
        if fs::normalize(&cfg.project_root).starts_with(&build_dir) {
            bail!(
                "refusing to clean `{}`: build directory `{}` contains the project root",
                cfg.id,
                build_dir.display()
            );
        }
        fs::remove_dir_all_if_exists(&build_dir)?;
        if let Some(ref artifact) = cfg.artifact {
            fs::remove_file_if_exists(artifact)?;
        }
        console.append(
            &cfg.id,
            &format!("removed {}", cfg.build_dir.display()),
        );
        Ok(())
    }
}

impl BuildRunner for CommandBuildRunner {
    fn invoke(
        &self,
        kind: BuildKind,
        cfg: &BuildConfiguration,
        console: &dyn ConsoleSink,
    ) -> Result<InvokeOutcome> {
        let argv = if kind == BuildKind::Clean {
            if cfg.builder.clean.is_empty() {
                Self::remove_outputs(cfg, console)?;
                return Ok(InvokeOutcome {
                    is_clean: true,
                    errors: 0,
                });
            }
            &cfg.builder.clean
        } else {
            if cfg.builder.build.is_empty() {
                bail!("configuration `{}` has no build command", cfg.id);
            }
            fs::ensure_dir(&cfg.build_dir)?;
            &cfg.builder.build
        };

        let cmd = self.env.command(cfg, argv)?;
        tracing::debug!("{}: {} build: `{}`", cfg.id, kind, cmd.display_command());
        let output = cmd.exec()?;

        for stream in [&output.stdout, &output.stderr] {
            let text = String::from_utf8_lossy(stream);
            if !text.trim().is_empty() {
                console.append(&cfg.id, text.trim_end());
            }
        }

        let errors = if output.status.success() {
            0
        } else {
            let reported = String::from_utf8_lossy(&output.stderr)
                .lines()
                .filter(|l| l.contains("error:"))
                .count();
            console.append(
                &cfg.id,
                &format!(
                    "`{}` exited with status {}",
                    cmd.display_command(),
                    output
                        .status
                        .code()
                        .map_or_else(|| "unknown".to_string(), |c| c.to_string())
                ),
            );
            reported.max(1)
        };

        Ok(InvokeOutcome {
            is_clean: kind == BuildKind::Clean,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ConfigId;
    use crate::test_support::RecordingConsole;
    use tempfile::TempDir;

    fn cfg(tmp: &TempDir) -> BuildConfiguration {
        let mut cfg = BuildConfiguration::new(ConfigId::new("app", "Debug"), tmp.path())
            .with_artifact("build/Debug/app");
        cfg.builder.build = vec![
            "sh".into(),
            "-c".into(),
            "echo building $MBUILD_CONFIGURATION && touch \"$MBUILD_BUILD_DIR/app\"".into(),
        ];
        cfg
    }

    fn runner() -> CommandBuildRunner {
        CommandBuildRunner::new(Arc::new(BuildEnvironment::default()))
    }

    #[test]
    fn test_build_runs_in_environment() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp);
        let console = RecordingConsole::default();

        let outcome = runner().invoke(BuildKind::Auto, &cfg, &console).unwrap();
        assert_eq!(outcome, InvokeOutcome::default());
        assert!(cfg.artifact.as_ref().unwrap().exists());
        assert!(console.text(&cfg.id).contains("building Debug"));
    }

    #[test]
    fn test_failing_build_reports_errors() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = cfg(&tmp);
        cfg.builder.build = vec![
            "sh".into(),
            "-c".into(),
            "echo 'main.c:1: error: x' >&2; echo 'main.c:2: error: y' >&2; exit 2".into(),
        ];
        let console = RecordingConsole::default();

        let outcome = runner().invoke(BuildKind::Incremental, &cfg, &console).unwrap();
        assert_eq!(outcome.errors, 2);
        assert!(console.text(&cfg.id).contains("exited with status 2"));
    }

    #[test]
    fn test_missing_program_is_invocation_failure() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = cfg(&tmp);
        cfg.builder.build = vec!["definitely-not-a-build-tool-xyz".into()];
        let console = RecordingConsole::default();
        assert!(runner().invoke(BuildKind::Full, &cfg, &console).is_err());
    }

    #[test]
    fn test_clean_without_command_removes_outputs() {
        let tmp = TempDir::new().unwrap();
        let cfg = cfg(&tmp);
        let console = RecordingConsole::default();
        runner().invoke(BuildKind::Auto, &cfg, &console).unwrap();

        let outcome = runner().invoke(BuildKind::Clean, &cfg, &console).unwrap();
        assert!(outcome.is_clean);
        assert!(!cfg.build_dir.exists());
    }

    #[test]
    fn test_clean_never_removes_project_root() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("main.c"), "int main() {}").unwrap();

        for build_dir in [tmp.path().join("."), tmp.path().join("src/..")] {
            let mut cfg = cfg(&tmp);
            cfg.build_dir = build_dir;
            let console = RecordingConsole::default();

            let err = runner().invoke(BuildKind::Clean, &cfg, &console).unwrap_err();
            assert!(err.to_string().contains("contains the project root"));
            assert!(src.join("main.c").exists());
        }
    }

    #[test]
    fn test_no_build_command() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = cfg(&tmp);
        cfg.builder.build.clear();
        let console = RecordingConsole::default();
        let err = runner().invoke(BuildKind::Auto, &cfg, &console).unwrap_err();
        assert!(err.to_string().contains("has no build command"));
    }
}
