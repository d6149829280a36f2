//! Feeding build output and provider output to console parsers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};

use crate::builder::cancel::CancelToken;
use crate::scanner::parser::ConsoleParser;
use crate::scanner::profile::{ProviderAction, ScannerInfoProvider};
use crate::util::process::ProcessBuilder;

/// Reads output line by line into a parser, stopping when cancelled.
pub struct BuildOutputReader {
    cancel: CancelToken,
}

impl BuildOutputReader {
    pub fn new(cancel: CancelToken) -> Self {
        BuildOutputReader { cancel }
    }

    /// Feed every line of `reader` to `parser`.
    ///
    /// Returns false if cancelled before the end of input.
    pub fn read_lines(&self, reader: impl BufRead, parser: &mut dyn ConsoleParser) -> Result<bool> {
        let mut lines = 0usize;
        for line in reader.lines() {
            if self.cancel.is_cancelled() {
                tracing::debug!("build output reading cancelled after {} lines", lines);
                return Ok(false);
            }
            let line = line.context("failed to read build output")?;
            parser.process_line(line.trim_end_matches('\r'));
            lines += 1;
        }
        tracing::debug!("read {} lines of build output", lines);
        Ok(true)
    }

    /// Feed a build-output log to `parser`.
    pub fn read_file(&self, path: &Path, parser: &mut dyn ConsoleParser) -> Result<bool> {
        let file = File::open(path)
            .with_context(|| format!("failed to open build output: {}", path.display()))?;
        self.read_lines(BufReader::new(file), parser)
    }

    /// Invoke a scanner-info provider in `project_root`.
    ///
    /// `open` providers read their file (relative to the project root);
    /// `run` providers execute their command and parse its stdout followed
    /// by its stderr, where GCC prints its include search list.
    pub fn run_provider(
        &self,
        provider: &ScannerInfoProvider,
        project_root: &Path,
        parser: &mut dyn ConsoleParser,
    ) -> Result<bool> {
        match provider.action {
            ProviderAction::Open { ref path } => self.read_file(&project_root.join(path), parser),
            ProviderAction::Run {
                ref command,
                ref arguments,
            } => {
                let mut argv = vec![command.clone()];
                argv.extend(arguments.iter().cloned());
                let output = ProcessBuilder::from_argv(&argv)?
                    .cwd(project_root)
                    .exec()
                    .with_context(|| format!("scanner provider `{}` failed", provider.id))?;
                if !output.status.success() {
                    tracing::warn!(
                        "scanner provider `{}` exited with status {:?}",
                        provider.id,
                        output.status.code()
                    );
                }

                for stream in [&output.stdout, &output.stderr] {
                    if !self.read_lines(stream.as_slice(), parser)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }
}
