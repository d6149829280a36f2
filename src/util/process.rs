//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{bail, Context, Result};

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Create a process builder from an argv vector (`[program, args...]`).
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command line");
        };
        Ok(ProcessBuilder::new(resolve_program(program)).args(args))
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set several environment variables.
    pub fn envs<'a>(mut self, vars: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion, capturing output.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("running `{}`", self.display_command());

        let output = cmd
            .output()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        Ok(output)
    }

    /// Execute and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr
            );
        }
        Ok(output)
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Resolve a bare program name through PATH; paths are returned unchanged.
fn resolve_program(program: &str) -> PathBuf {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.to_path_buf();
    }
    find_executable(program).unwrap_or_else(|| as_path.to_path_buf())
}
