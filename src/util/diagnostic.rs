//! User-friendly diagnostic messages.
//!
//! Every error shown to a user should carry the root cause and, where one
//! exists, a concrete next step.

use std::fmt;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when build fails.
    pub const BUILD_FAILED: &str = "help: Run `mbuild build --verbose` for more details";

    /// Suggestion when incremental state looks inconsistent.
    pub const STALE_STATE: &str =
        "help: Run `mbuild clean` to discard build state and start from a full rebuild";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity,
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = match (color, self.severity) {
            (true, Severity::Error) => "\x1b[1;31merror\x1b[0m".to_string(),
            (true, Severity::Warning) => "\x1b[1;33mwarning\x1b[0m".to_string(),
            (false, severity) => severity.to_string(),
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  = {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// A configuration selector on the command line matched nothing.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("no configuration matches `{selector}`")]
#[diagnostic(
    code(mbuild::workspace::configuration_not_found),
    help("Selectors are `<project>`, `<project>/<configuration>` or `<configuration>`")
)]
pub struct ConfigurationNotFoundError {
    pub selector: String,
}

/// A scanner profile id is not registered.
#[derive(Debug, Error, MietteDiagnostic)]
#[error("unknown scanner profile `{id}`")]
#[diagnostic(code(mbuild::scanner::unknown_profile))]
pub struct UnknownProfileError {
    pub id: String,
    #[help]
    pub available: Option<String>,
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
