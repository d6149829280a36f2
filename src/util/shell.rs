//! Centralized shell output and progress management.
//!
//! The Shell provides a unified API for all CLI output:
//! - Status messages with consistent formatting
//! - A progress bar over projects (via indicatif)
//! - JSON output mode for machine-readable output
//! - The console sink that collects build tool output per configuration
//!
//! Human and JSON modes are mutually exclusive: when JSON mode is enabled
//! nothing but line-delimited events is written to stdout.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::builder::collaborators::ConsoleSink;
use crate::builder::events::BuildEvent;
use crate::core::ConfigId;

/// Shell output mode - Human and Json are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellMode {
    /// Human-readable output with optional colors and progress bars.
    Human {
        verbosity: Verbosity,
        color: ColorChoice,
    },
    /// Machine-readable JSON output only.
    Json,
}

impl Default for ShellMode {
    fn default() -> Self {
        ShellMode::Human {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
        }
    }
}

/// Output verbosity level (Human mode only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// --quiet: errors only, no progress
    Quiet,
    /// Default: status messages + progress bar
    #[default]
    Normal,
    /// --verbose: build tool output echoed as it arrives, no progress bar
    Verbose,
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    /// Detect TTY and use colors if available.
    #[default]
    Auto,
    /// Always use ANSI colors.
    Always,
    /// Never use ANSI colors.
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            _ => Err(format!(
                "invalid color choice '{}'; expected 'auto', 'always', or 'never'",
                s
            )),
        }
    }
}

/// Status types for output messages.
///
/// Shell handles all formatting - callers just specify the semantic status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    // Success statuses (green)
    Finished,
    Cleaned,
    Removed,

    // In-progress statuses (cyan)
    Building,
    Generating,
    Cleaning,
    Scanning,

    // Info statuses (blue)
    Info,
    Fresh,

    // Warning statuses (yellow)
    Skipped,
    Postponed,
    Warning,

    // Error status (red)
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Finished => "Finished",
            Status::Cleaned => "Cleaned",
            Status::Removed => "Removed",
            Status::Building => "Building",
            Status::Generating => "Generating",
            Status::Cleaning => "Cleaning",
            Status::Scanning => "Scanning",
            Status::Info => "Info",
            Status::Fresh => "Fresh",
            Status::Skipped => "Skipped",
            Status::Postponed => "Postponed",
            Status::Warning => "Warning",
            Status::Error => "error",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Status::Finished | Status::Cleaned | Status::Removed => "\x1b[1;32m",
            Status::Building | Status::Generating | Status::Cleaning | Status::Scanning => {
                "\x1b[1;36m"
            }
            Status::Info | Status::Fresh => "\x1b[1;34m",
            Status::Skipped | Status::Postponed | Status::Warning => "\x1b[1;33m",
            Status::Error => "\x1b[1;31m",
        }
    }
}

/// Width statuses are right-aligned to.
const STATUS_WIDTH: usize = 12;

/// Central shell for all CLI output.
#[derive(Debug)]
pub struct Shell {
    mode: ShellMode,
    use_color: bool,
    /// Build tool output captured per configuration since its markers were cleared
    captured: Mutex<BTreeMap<ConfigId, Vec<String>>>,
}

impl Shell {
    /// Create a new shell with the given mode.
    pub fn new(mode: ShellMode) -> Self {
        let use_color = match &mode {
            ShellMode::Json => false,
            ShellMode::Human { color, .. } => match color {
                ColorChoice::Auto => io::stderr().is_terminal(),
                ColorChoice::Always => true,
                ColorChoice::Never => false,
            },
        };

        Shell {
            mode,
            use_color,
            captured: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a shell from CLI flags with proper precedence.
    ///
    /// JSON mode takes precedence over quiet/verbose.
    pub fn from_flags(
        quiet: bool,
        verbose: bool,
        color: ColorChoice,
        message_format_json: bool,
    ) -> Self {
        let mode = if message_format_json {
            ShellMode::Json
        } else {
            let verbosity = if quiet {
                Verbosity::Quiet
            } else if verbose {
                Verbosity::Verbose
            } else {
                Verbosity::Normal
            };
            ShellMode::Human { verbosity, color }
        };

        Shell::new(mode)
    }

    pub fn mode(&self) -> &ShellMode {
        &self.mode
    }

    pub fn is_quiet(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Quiet,
                ..
            }
        )
    }

    pub fn is_verbose(&self) -> bool {
        matches!(
            self.mode,
            ShellMode::Human {
                verbosity: Verbosity::Verbose,
                ..
            }
        )
    }

    pub fn is_json(&self) -> bool {
        matches!(self.mode, ShellMode::Json)
    }

    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Print a status message.
    ///
    /// Format: `{status:>12} {message}`
    ///
    /// In quiet mode, only Error status is printed.
    /// In JSON mode, messages are silently ignored (use `event` for JSON output).
    pub fn status(&self, status: Status, msg: impl Display) {
        if self.is_json() {
            return;
        }

        if self.is_quiet() && status != Status::Error {
            return;
        }

        eprintln!("{} {}", self.format_status(status), msg);
    }

    pub fn warn(&self, msg: impl Display) {
        if self.is_json() {
            self.event(&BuildEvent::diagnostic("warning", msg.to_string()));
        } else {
            self.status(Status::Warning, msg);
        }
    }

    /// Print an error message.
    ///
    /// In JSON mode, this outputs a diagnostic event.
    pub fn error(&self, msg: impl Display) {
        if self.is_json() {
            self.event(&BuildEvent::diagnostic("error", msg.to_string()));
        } else {
            self.status(Status::Error, msg);
        }
    }

    /// Print a build event to stdout.
    ///
    /// Only works in JSON mode; silently ignored in human mode.
    pub fn event(&self, event: &BuildEvent) {
        if !self.is_json() {
            return;
        }

        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{}", event.to_json());
        let _ = stdout.flush();
    }

    /// Remove and return the output captured for a configuration.
    pub fn take_output(&self, id: &ConfigId) -> Vec<String> {
        self.captured
            .lock()
            .map(|mut captured| captured.remove(id).unwrap_or_default())
            .unwrap_or_default()
    }

    fn format_status(&self, status: Status) -> String {
        let text = status.as_str();

        if self.use_color {
            format!(
                "{}{:>width$}\x1b[0m",
                status.color_code(),
                text,
                width = STATUS_WIDTH
            )
        } else {
            format!("{:>width$}", text, width = STATUS_WIDTH)
        }
    }

    /// Create a progress bar.
    ///
    /// In quiet, verbose or JSON mode the bar is hidden.
    pub fn progress(self: &Arc<Self>, total: u64, msg: impl Display) -> Progress {
        Progress::new(Arc::clone(self), total, msg.to_string())
    }
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new(ShellMode::default())
    }
}

impl ConsoleSink for Shell {
    fn append(&self, cfg: &ConfigId, text: &str) {
        if self.is_json() {
            self.event(&BuildEvent::output(cfg, text));
        } else if self.is_verbose() {
            eprint!("{}", text);
            if !text.ends_with('\n') {
                eprintln!();
            }
        }

        if let Ok(mut captured) = self.captured.lock() {
            captured
                .entry(cfg.clone())
                .or_default()
                .extend(text.lines().map(str::to_string));
        }
    }

    fn clear_markers(&self, cfg: &ConfigId) {
        tracing::debug!("clearing console markers for {}", cfg);
        if let Ok(mut captured) = self.captured.lock() {
            captured.remove(cfg);
        }
    }
}

/// Progress bar wrapper that respects shell mode.
pub struct Progress {
    shell: Arc<Shell>,
    pb: Option<ProgressBar>,
    total: u64,
    current: u64,
    message: String,
}

impl Progress {
    fn new(shell: Arc<Shell>, total: u64, message: String) -> Self {
        let pb = if shell.is_quiet() || shell.is_verbose() || shell.is_json() {
            None
        } else if total > 1 {
            let pb = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
            {
                pb.set_style(style.progress_chars("#>-"));
            }
            pb.set_message(message.clone());
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        Progress {
            shell,
            pb,
            total,
            current: 0,
            message,
        }
    }

    /// Advance progress.
    pub fn inc(&mut self, delta: u64) {
        self.current += delta;

        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }

        if self.shell.is_json() {
            self.shell
                .event(&BuildEvent::progress(self.current, self.total, "projects"));
        }

        if self.shell.is_verbose() {
            eprintln!("  {} [{}/{}]", self.message, self.current, self.total);
        }
    }

    /// Print a status line without tearing the bar.
    pub fn status(&self, status: Status, msg: impl Display) {
        match &self.pb {
            Some(pb) => pb.suspend(|| self.shell.status(status, msg)),
            None => self.shell.status(status, msg),
        }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

/// Format a duration in a human-readable way.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}
