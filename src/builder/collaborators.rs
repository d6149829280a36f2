//! Collaborator interfaces the build orchestrator depends on.
//!
//! Everything that touches the outside world (change detection, persisted
//! state, build-file generation, spawning builders, reporting output) sits
//! behind one of these traits. The crate ships filesystem- and
//! process-backed implementations; tests use the recording mocks in
//! `test_support`.

use std::fmt;

use anyhow::Result;

use crate::builder::ledger::BuildState;
use crate::core::{BuildConfiguration, BuildKind, ChangeSet, ConfigId};

/// Source of per-project change sets.
pub trait DeltaProvider: Send + Sync {
    /// Changes to `project` since `observer` last recorded a built state.
    ///
    /// `None` means no change set is available (unknown history or a
    /// full build), which consumers treat as "everything changed".
    fn delta(&self, observer: &ConfigId, project: &str, kind: BuildKind) -> Option<ChangeSet>;

    /// Record the current state of `projects` as `observer`'s new baseline.
    fn remember_built_state(&self, observer: &ConfigId, projects: &[String]) -> Result<()>;
}

/// Lookup and persistence of build configurations.
pub trait ConfigurationRegistry: Send + Sync {
    fn get(&self, id: &ConfigId) -> Option<BuildConfiguration>;

    /// Every configuration id, sorted.
    fn list(&self) -> Vec<ConfigId>;

    /// Persist the rebuild flags of `cfg`.
    fn update(&self, cfg: &BuildConfiguration) -> Result<()>;

    fn configurations_of(&self, project: &str) -> Vec<BuildConfiguration> {
        self.list()
            .iter()
            .filter(|id| id.project() == project)
            .filter_map(|id| self.get(id))
            .collect()
    }
}

/// Per-configuration build state store.
pub trait BuildStateLedger: Send + Sync {
    fn get(&self, id: &ConfigId) -> Option<BuildState>;
    fn replace(&self, id: &ConfigId, state: BuildState) -> Result<()>;
    fn remove(&self, id: &ConfigId) -> Result<()>;
}

/// Severity of a generator result, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Ok => "ok",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// Machine-readable reason attached to a generator status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The configuration has no existing source folder to generate from.
    NoSourceFolders,
    GenerationFailed,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub severity: Severity,
    pub code: StatusCode,
    pub message: String,
}

/// Aggregated outcome of a generator operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiResult {
    entries: Vec<StatusEntry>,
}

impl MultiResult {
    pub fn ok() -> Self {
        MultiResult::default()
    }

    pub fn with(mut self, severity: Severity, code: StatusCode, message: impl Into<String>) -> Self {
        self.entries.push(StatusEntry {
            severity,
            code,
            message: message.into(),
        });
        self
    }

    pub fn warning(code: StatusCode, message: impl Into<String>) -> Self {
        MultiResult::ok().with(Severity::Warning, code, message)
    }

    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        MultiResult::ok().with(Severity::Error, code, message)
    }

    /// The most severe entry's severity (`Ok` when empty).
    pub fn severity(&self) -> Severity {
        self.entries
            .iter()
            .map(|e| e.severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn has_code(&self, code: StatusCode) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    /// All entry messages, one per line.
    pub fn message(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Generates the build files a managed configuration's builder consumes.
pub trait BuildFileGenerator: Send + Sync {
    /// Clean whatever `changes` invalidated. An error means the impact
    /// could not be determined.
    fn analyze_impact(&self, cfg: &BuildConfiguration, changes: Option<&ChangeSet>) -> Result<()>;

    fn regenerate_all(&self, cfg: &BuildConfiguration) -> MultiResult;

    fn generate_incremental(&self, cfg: &BuildConfiguration, changes: &ChangeSet) -> MultiResult;

    fn regenerate_dependencies(&self, cfg: &BuildConfiguration, full: bool) -> Result<()>;

    fn generate_dependencies(&self, cfg: &BuildConfiguration) -> Result<()>;
}

/// Supplies a generator for a configuration, if it has one.
pub trait GeneratorProvider: Send + Sync {
    fn generator_for(&self, cfg: &BuildConfiguration) -> Option<Box<dyn BuildFileGenerator>>;
}

/// What a single builder invocation reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeOutcome {
    /// The invocation was a clean.
    pub is_clean: bool,
    /// Number of build-blocking errors.
    pub errors: usize,
}

/// Runs a configuration's builder.
pub trait BuildRunner: Send + Sync {
    /// An `Err` is an invocation failure (the builder could not be run);
    /// build errors are reported through `InvokeOutcome::errors`.
    fn invoke(
        &self,
        kind: BuildKind,
        cfg: &BuildConfiguration,
        console: &dyn ConsoleSink,
    ) -> Result<InvokeOutcome>;
}

/// Destination for build tool output.
pub trait ConsoleSink: Send + Sync {
    fn append(&self, cfg: &ConfigId, text: &str);
    fn clear_markers(&self, cfg: &ConfigId);
}
