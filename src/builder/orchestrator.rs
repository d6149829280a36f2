//! Per-project build pass.
//!
//! The orchestrator walks the participating configurations of one project in
//! reference order. Each one is decided, then (when it builds) optionally
//! cleaned, its build files generated, its builder invoked and its
//! dependency files refreshed. Rebuild flags are persisted on every path so
//! an interrupted or failed pass is re-examined next time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::builder::cancel::CancelToken;
use crate::builder::classify::ChangeClassifier;
use crate::builder::collaborators::{
    BuildFileGenerator, BuildRunner, BuildStateLedger, ConfigurationRegistry, ConsoleSink,
    DeltaProvider, GeneratorProvider, Severity, StatusCode,
};
use crate::builder::decision::{
    BuildDecisionEngine, BuildRequestContext, Decision, DecisionInputs, Verdict,
};
use crate::builder::error::BuildError;
use crate::core::{BuildConfiguration, BuildKind, ChangeSet, ConfigId, DependencyGraph};
use crate::util::config::DEFAULT_RESERVED_NAMES;
use crate::util::fs;

/// The services a build pass talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn ConfigurationRegistry>,
    pub deltas: Arc<dyn DeltaProvider>,
    pub ledger: Arc<dyn BuildStateLedger>,
    pub generators: Arc<dyn GeneratorProvider>,
    pub runner: Arc<dyn BuildRunner>,
    pub console: Arc<dyn ConsoleSink>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Echo generator status messages to the console.
    pub verbose: bool,
    pub check_resource_changes: bool,
    pub reserved_names: Vec<String>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        OrchestratorOptions {
            verbose: false,
            check_resource_changes: true,
            reserved_names: DEFAULT_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// How a configuration's pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    Built,
    Cleaned,
    Skipped,
    Postponed,
    /// The builder is disabled for the requested kind
    Disabled,
    ConfigError(String),
    /// The clean preceding regeneration reported errors
    CleanFailed(String),
    GenerationFailed(String),
    NoSources(String),
    BuildErrors(usize),
}

impl ConfigOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigOutcome::Built => "built",
            ConfigOutcome::Cleaned => "cleaned",
            ConfigOutcome::Skipped => "skipped",
            ConfigOutcome::Postponed => "postponed",
            ConfigOutcome::Disabled => "disabled",
            ConfigOutcome::ConfigError(_) => "config-error",
            ConfigOutcome::CleanFailed(_) => "clean-failed",
            ConfigOutcome::GenerationFailed(_) => "generation-failed",
            ConfigOutcome::NoSources(_) => "no-sources",
            ConfigOutcome::BuildErrors(_) => "build-errors",
        }
    }

    /// Whether the outcome leaves the pass successful.
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            ConfigOutcome::ConfigError(_)
                | ConfigOutcome::CleanFailed(_)
                | ConfigOutcome::GenerationFailed(_)
                | ConfigOutcome::BuildErrors(_)
        )
    }
}

impl fmt::Display for ConfigOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOutcome::ConfigError(msg)
            | ConfigOutcome::CleanFailed(msg)
            | ConfigOutcome::GenerationFailed(msg)
            | ConfigOutcome::NoSources(msg) => write!(f, "{}: {}", self.as_str(), msg),
            ConfigOutcome::BuildErrors(n) => write!(f, "{} error(s)", n),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// One configuration's entry in a project report.
#[derive(Debug, Clone)]
pub struct ConfigReport {
    pub id: ConfigId,
    /// None when the configuration was never decided
    pub verdict: Option<Verdict>,
    pub outcome: ConfigOutcome,
}

/// Result of a project pass.
#[derive(Debug, Clone, Default)]
pub struct ProjectReport {
    pub project: String,
    pub configs: Vec<ConfigReport>,
}

impl ProjectReport {
    fn new(project: &str) -> Self {
        ProjectReport {
            project: project.to_string(),
            configs: Vec::new(),
        }
    }

    fn push(&mut self, id: &ConfigId, verdict: Option<Verdict>, outcome: ConfigOutcome) {
        self.configs.push(ConfigReport {
            id: id.clone(),
            verdict,
            outcome,
        });
    }

    /// Configurations built or cleaned in this pass.
    pub fn built(&self) -> Vec<ConfigId> {
        self.configs
            .iter()
            .filter(|c| matches!(c.outcome, ConfigOutcome::Built | ConfigOutcome::Cleaned))
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.configs.iter().all(|c| c.outcome.is_success())
    }

    pub fn outcome_of(&self, id: &ConfigId) -> Option<&ConfigOutcome> {
        self.configs.iter().find(|c| &c.id == id).map(|c| &c.outcome)
    }
}

/// Where a configuration stands after cleaning and generation.
pub struct BuildStatus {
    pub is_managed_build: bool,
    /// Build files were regenerated from scratch
    pub rebuild_required: bool,
    pub build_allowed: bool,
    pub console_messages: Vec<String>,
    generator: Option<Box<dyn BuildFileGenerator>>,
    /// Why the build was called off
    cancelled: Option<ConfigOutcome>,
}

impl BuildStatus {
    fn new(is_managed_build: bool) -> Self {
        BuildStatus {
            is_managed_build,
            rebuild_required: false,
            build_allowed: true,
            console_messages: Vec::new(),
            generator: None,
            cancelled: None,
        }
    }

    fn cancel(&mut self, message: String, outcome: fn(String) -> ConfigOutcome) {
        self.build_allowed = false;
        self.console_messages.push(message.clone());
        self.cancelled = Some(outcome(message));
    }
}

/// Drives the build of one project's configurations.
pub struct BuildOrchestrator {
    collab: Collaborators,
    graph: Arc<DependencyGraph>,
    engine: BuildDecisionEngine,
    options: OrchestratorOptions,
    cancel: CancelToken,
}

impl BuildOrchestrator {
    pub fn new(collab: Collaborators, graph: Arc<DependencyGraph>) -> Self {
        Self::with_options(collab, graph, OrchestratorOptions::default())
    }

    pub fn with_options(
        collab: Collaborators,
        graph: Arc<DependencyGraph>,
        options: OrchestratorOptions,
    ) -> Self {
        let engine = BuildDecisionEngine::new(options.reserved_names.clone())
            .with_resource_checks(options.check_resource_changes);
        BuildOrchestrator {
            collab,
            graph,
            engine,
            options,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn engine(&self) -> &BuildDecisionEngine {
        &self.engine
    }

    /// Current registry state of a configuration.
    pub fn configuration(&self, id: &ConfigId) -> Option<BuildConfiguration> {
        self.collab.registry.get(id)
    }

    /// Refuse the whole request if any participating builder cannot be used.
    pub fn check_builders(
        &self,
        kind: BuildKind,
        ctx: &BuildRequestContext,
    ) -> Result<(), BuildError> {
        for id in &ctx.building {
            if let Some(cfg) = self.collab.registry.get(id) {
                if cfg.builder.enabled_for(kind) {
                    BuildDecisionEngine::check_builders(&cfg)?;
                }
            }
        }
        Ok(())
    }

    /// Participating configurations of `project`, references first.
    pub fn project_configurations(
        &self,
        project: &str,
        ctx: &BuildRequestContext,
    ) -> Vec<ConfigId> {
        let mut ordered: Vec<ConfigId> = self
            .graph
            .build_order()
            .into_iter()
            .filter(|id| id.project() == project && ctx.building.contains(id))
            .collect();
        // Configurations the graph doesn't know about go last.
        for id in &ctx.building {
            if id.project() == project && !ordered.contains(id) {
                ordered.push(id.clone());
            }
        }
        ordered
    }

    /// Projects whose change sets a configuration's decision depends on.
    fn observed_projects(&self, cfg: &BuildConfiguration) -> Vec<String> {
        let mut projects: BTreeSet<String> = BTreeSet::new();
        projects.insert(cfg.project().to_string());
        for id in self.graph.all_references(&cfg.id) {
            projects.insert(id.project().to_string());
        }
        projects.into_iter().collect()
    }

    fn collect_changes(
        &self,
        cfg: &BuildConfiguration,
        kind: BuildKind,
    ) -> BTreeMap<String, Option<ChangeSet>> {
        self.observed_projects(cfg)
            .into_iter()
            .map(|project| {
                let delta = self.collab.deltas.delta(&cfg.id, &project, kind);
                (project, delta)
            })
            .collect()
    }

    /// Decide a configuration without building anything.
    pub fn evaluate(
        &self,
        cfg: &BuildConfiguration,
        kind: BuildKind,
        ctx: &BuildRequestContext,
    ) -> Result<Verdict, BuildError> {
        let changes = self.collect_changes(cfg, kind);
        let inputs = DecisionInputs {
            graph: &self.graph,
            registry: self.collab.registry.as_ref(),
            changes: &changes,
        };
        self.engine.evaluate(cfg, kind, ctx, &inputs)
    }

    fn persist(&self, cfg: &BuildConfiguration) -> Result<(), BuildError> {
        self.collab
            .registry
            .update(cfg)
            .map_err(|source| BuildError::State {
                id: cfg.id.clone(),
                source,
            })
    }

    fn mark_rebuild(&self, cfg: &mut BuildConfiguration, rebuild: bool) -> Result<(), BuildError> {
        cfg.set_rebuild_state(rebuild);
        self.persist(cfg)
    }

    fn forget(&self, cfg: &BuildConfiguration) -> Result<(), BuildError> {
        self.collab
            .ledger
            .remove(&cfg.id)
            .map_err(|source| BuildError::State {
                id: cfg.id.clone(),
                source,
            })
    }

    fn remember(&self, cfg: &BuildConfiguration) -> Result<(), BuildError> {
        self.collab
            .deltas
            .remember_built_state(&cfg.id, &self.observed_projects(cfg))
            .map_err(|source| BuildError::State {
                id: cfg.id.clone(),
                source,
            })
    }

    /// Stop before `id` is started; its flags are left untouched.
    fn check_cancel_before(&self, id: &ConfigId) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            tracing::debug!("cancelled before {}", id);
            return Err(BuildError::Cancelled { id: id.clone() });
        }
        Ok(())
    }

    /// Stop while `cfg` is in progress, leaving it marked for a rebuild.
    fn check_cancel(&self, cfg: &mut BuildConfiguration) -> Result<(), BuildError> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        tracing::debug!("cancelled while processing {}", cfg.id);
        self.mark_rebuild(cfg, true)?;
        Err(BuildError::Cancelled { id: cfg.id.clone() })
    }

    fn remove_artifacts(&self, attempted: &[ConfigId]) {
        for id in attempted {
            let Some(artifact) = self.collab.registry.get(id).and_then(|c| c.artifact) else {
                continue;
            };
            match fs::remove_file_if_exists(&artifact) {
                Ok(true) => tracing::debug!("removed {}", artifact.display()),
                Ok(false) => {}
                Err(e) => tracing::warn!("{:#}", e),
            }
        }
    }

    /// Abort the pass after an invocation failure.
    fn fail(
        &self,
        cfg: &mut BuildConfiguration,
        attempted: &[ConfigId],
        source: anyhow::Error,
    ) -> BuildError {
        if let Err(e) = self.mark_rebuild(cfg, true) {
            tracing::warn!("{:#}", e);
        }
        self.remove_artifacts(attempted);
        BuildError::Invocation {
            id: cfg.id.clone(),
            source,
        }
    }

    /// Build every participating configuration of `project`.
    ///
    /// Configuration and generation problems are recorded in the report and
    /// the pass continues. An invocation failure or cancellation ends the
    /// pass with an error.
    pub fn build_project(
        &self,
        project: &str,
        kind: BuildKind,
        ctx: &BuildRequestContext,
    ) -> Result<ProjectReport, BuildError> {
        let mut report = ProjectReport::new(project);
        let mut attempted: Vec<ConfigId> = Vec::new();
        let mut had_errors = false;

        for id in self.project_configurations(project, ctx) {
            self.check_cancel_before(&id)?;
            let Some(mut cfg) = self.collab.registry.get(&id) else {
                report.push(
                    &id,
                    None,
                    ConfigOutcome::ConfigError(format!("unknown configuration `{}`", id)),
                );
                continue;
            };

            if !cfg.builder.enabled_for(kind) {
                tracing::debug!("{}: builder disabled for {} builds", id, kind);
                report.push(&id, None, ConfigOutcome::Disabled);
                continue;
            }

            let changes = self.collect_changes(&cfg, kind);
            let inputs = DecisionInputs {
                graph: &self.graph,
                registry: self.collab.registry.as_ref(),
                changes: &changes,
            };
            let verdict = match self.engine.evaluate(&cfg, kind, ctx, &inputs) {
                Ok(verdict) => verdict,
                Err(e @ BuildError::BuilderCheck { .. }) => {
                    self.collab.console.append(&id, &e.to_string());
                    report.push(&id, None, ConfigOutcome::ConfigError(e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };
            tracing::debug!("{}: {} ({})", id, verdict.decision, verdict.reason);

            match verdict.decision {
                Decision::Skip => {
                    self.collab
                        .console
                        .append(&id, &format!("nothing to be done for `{}`", id));
                    self.remember(&cfg)?;
                    report.push(&id, Some(verdict), ConfigOutcome::Skipped);
                    continue;
                }
                Decision::Postpone => {
                    report.push(&id, Some(verdict), ConfigOutcome::Postponed);
                    continue;
                }
                Decision::Build => {}
            }

            if kind == BuildKind::Clean {
                attempted.push(id.clone());
                self.collab.console.clear_markers(&id);
                let invoked =
                    self.collab
                        .runner
                        .invoke(BuildKind::Clean, &cfg, self.collab.console.as_ref());
                let outcome = match invoked {
                    Ok(outcome) => outcome,
                    Err(source) => return Err(self.fail(&mut cfg, &attempted, source)),
                };
                self.check_cancel(&mut cfg)?;
                self.forget(&cfg)?;
                self.mark_rebuild(&mut cfg, true)?;
                let outcome = if outcome.errors > 0 {
                    had_errors = true;
                    ConfigOutcome::BuildErrors(outcome.errors)
                } else {
                    ConfigOutcome::Cleaned
                };
                report.push(&id, Some(verdict), outcome);
                continue;
            }

            let own_changes = changes.get(cfg.project()).cloned().flatten();
            let mut status = self.prepare(&mut cfg, own_changes.as_ref(), &attempted)?;
            for message in &status.console_messages {
                self.collab.console.append(&id, message);
            }
            if let Some(outcome) = status.cancelled.take() {
                report.push(&id, Some(verdict), outcome);
                continue;
            }

            attempted.push(id.clone());
            self.collab.console.clear_markers(&id);
            let invoked = self
                .collab
                .runner
                .invoke(kind, &cfg, self.collab.console.as_ref());
            let outcome = match invoked {
                Ok(outcome) => outcome,
                Err(source) => return Err(self.fail(&mut cfg, &attempted, source)),
            };
            self.check_cancel(&mut cfg)?;

            if outcome.is_clean {
                self.forget(&cfg)?;
                self.mark_rebuild(&mut cfg, true)?;
                report.push(&id, Some(verdict), ConfigOutcome::Cleaned);
                continue;
            }

            if let Some(ref generator) = status.generator {
                let post = if status.rebuild_required {
                    generator.regenerate_dependencies(&cfg, false)
                } else {
                    generator.generate_dependencies(&cfg)
                };
                if let Err(source) = post {
                    return Err(self.fail(&mut cfg, &attempted, source));
                }
            }

            if outcome.errors > 0 {
                had_errors = true;
                self.mark_rebuild(&mut cfg, true)?;
                report.push(&id, Some(verdict), ConfigOutcome::BuildErrors(outcome.errors));
            } else {
                self.mark_rebuild(&mut cfg, false)?;
                self.remember(&cfg)?;
                report.push(&id, Some(verdict), ConfigOutcome::Built);
            }
        }

        if had_errors {
            self.remove_artifacts(&attempted);
        }
        Ok(report)
    }

    /// Clean and generate build files for a managed configuration.
    fn prepare(
        &self,
        cfg: &mut BuildConfiguration,
        changes: Option<&ChangeSet>,
        attempted: &[ConfigId],
    ) -> Result<BuildStatus, BuildError> {
        let mut status = BuildStatus::new(cfg.is_managed());
        if !cfg.is_managed() || cfg.builder.internal {
            return Ok(status);
        }

        let Some(generator) = self.collab.generators.generator_for(cfg) else {
            status.cancel(
                format!("no build-file generator is available for `{}`", cfg.id),
                ConfigOutcome::ConfigError,
            );
            return Ok(status);
        };

        let known = changes.filter(|c| !c.is_unknown());
        let impact = generator.analyze_impact(cfg, known);
        if let Err(ref e) = impact {
            tracing::debug!("{}: impact analysis failed: {:#}", cfg.id, e);
        }

        let classified_full = known.is_some_and(|c| {
            ChangeClassifier::for_configuration(
                cfg,
                &self.collab.registry.configurations_of(cfg.project()),
                self.engine.reserved_names(),
            )
            .classify(Some(c))
            .full_rebuild_needed
        });
        let clean = cfg.needs_full_rebuild
            || (impact.is_err() && cfg.needs_rebuild)
            || classified_full;

        if clean {
            tracing::debug!("{}: cleaning before regeneration", cfg.id);
            let cleaned = self
                .collab
                .runner
                .invoke(BuildKind::Clean, cfg, self.collab.console.as_ref());
            match cleaned {
                Err(source) => return Err(self.fail(cfg, attempted, source)),
                Ok(outcome) if outcome.errors > 0 => {
                    self.mark_rebuild(cfg, true)?;
                    status.cancel(
                        format!(
                            "clean of `{}` reported {} error(s); build files were not regenerated",
                            cfg.id, outcome.errors
                        ),
                        ConfigOutcome::CleanFailed,
                    );
                    return Ok(status);
                }
                Ok(_) => {}
            }
            self.forget(cfg)?;
            self.check_cancel(cfg)?;
        }

        status.rebuild_required = clean || cfg.needs_rebuild || known.is_none();
        let result = match known {
            Some(changes) if !status.rebuild_required => generator.generate_incremental(cfg, changes),
            _ => generator.regenerate_all(cfg),
        };
        self.check_cancel(cfg)?;

        match result.severity() {
            Severity::Error => {
                self.mark_rebuild(cfg, true)?;
                status.cancel(result.message(), ConfigOutcome::GenerationFailed);
            }
            Severity::Warning | Severity::Info if result.has_code(StatusCode::NoSourceFolders) => {
                status.cancel(result.message(), ConfigOutcome::NoSources);
            }
            _ => {
                if self.options.verbose && !result.entries().is_empty() {
                    status.console_messages.push(result.message());
                }
            }
        }

        status.generator = Some(generator);
        Ok(status)
    }
}
