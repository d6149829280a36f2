//! Test utilities and mocks for mbuild unit tests.
//!
//! Every collaborator trait of the build orchestrator has a recording mock
//! here, so tests can drive a build pass without touching processes and can
//! assert on exactly what the orchestrator asked for.
//!
//! # Example
//!
//! ```rust,ignore
//! use mbuild::test_support::{Harness, WorkspaceFixture};
//!
//! let mut fixture = WorkspaceFixture::new();
//! fixture.exe("app", &[]);
//! let harness = Harness::new(fixture);
//! let report = harness.orchestrator().build_project("app", BuildKind::Auto, &ctx)?;
//! assert_eq!(harness.runner.calls().len(), 1);
//! ```

pub mod fixtures;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use crate::builder::cancel::CancelToken;
use crate::builder::collaborators::{
    BuildFileGenerator, BuildRunner, BuildStateLedger, ConfigurationRegistry, ConsoleSink,
    DeltaProvider, GeneratorProvider, InvokeOutcome, MultiResult,
};
use crate::builder::ledger::BuildState;
use crate::builder::orchestrator::{BuildOrchestrator, Collaborators, OrchestratorOptions};
use crate::core::{
    BaselineId, BuildConfiguration, BuildKind, ChangeRecord, ChangeSet, ConfigId,
    ConfigurationSet, DependencyGraph,
};

// Re-export fixtures for convenience
pub use fixtures::*;

/// Configuration registry that records every flag update.
pub struct MockRegistry {
    inner: ConfigurationSet,
    updates: Mutex<Vec<ConfigId>>,
}

impl MockRegistry {
    pub fn new(configs: impl IntoIterator<Item = BuildConfiguration>) -> Self {
        MockRegistry {
            inner: ConfigurationSet::in_memory(configs),
            updates: Mutex::new(Vec::new()),
        }
    }

    /// Ids passed to `update`, in call order.
    pub fn updates(&self) -> Vec<ConfigId> {
        self.updates.lock().unwrap().clone()
    }

    /// Overwrite a configuration directly (bypassing the update record).
    pub fn set(&self, cfg: BuildConfiguration) {
        self.inner.replace(cfg).unwrap();
    }
}

impl ConfigurationRegistry for MockRegistry {
    fn get(&self, id: &ConfigId) -> Option<BuildConfiguration> {
        self.inner.get(id)
    }

    fn list(&self) -> Vec<ConfigId> {
        self.inner.list()
    }

    fn update(&self, cfg: &BuildConfiguration) -> Result<()> {
        self.updates.lock().unwrap().push(cfg.id.clone());
        self.inner.update(cfg)
    }
}

/// Delta provider serving scripted change sets.
///
/// Every observer sees the same per-project change set until it calls
/// `remember_built_state` for that project; from then on it sees an empty,
/// known change set until the project's changes are scripted again.
pub struct MockDeltaProvider {
    default: Option<ChangeSet>,
    changes: Mutex<BTreeMap<String, Option<ChangeSet>>>,
    consumed: Mutex<BTreeSet<(ConfigId, String)>>,
    remembered: Mutex<Vec<(ConfigId, Vec<String>)>>,
}

impl MockDeltaProvider {
    /// Every project starts with unknown history.
    pub fn unknown() -> Self {
        Self::with_default(None)
    }

    /// Every project starts with a known, empty change set.
    pub fn unchanged() -> Self {
        Self::with_default(Some(ChangeSet::since(BaselineId(1))))
    }

    fn with_default(default: Option<ChangeSet>) -> Self {
        MockDeltaProvider {
            default,
            changes: Mutex::new(BTreeMap::new()),
            consumed: Mutex::new(BTreeSet::new()),
            remembered: Mutex::new(Vec::new()),
        }
    }

    /// Script a change in `project`, visible to every observer.
    pub fn change(&self, project: &str, record: ChangeRecord) {
        self.changes
            .lock()
            .unwrap()
            .entry(project.to_string())
            .or_insert(None)
            .get_or_insert_with(|| ChangeSet::since(BaselineId(1)))
            .push(record);
        self.consumed
            .lock()
            .unwrap()
            .retain(|(_, p)| p != project);
    }

    /// Make `project`'s history unknown.
    pub fn forget(&self, project: &str) {
        self.changes.lock().unwrap().insert(project.to_string(), None);
        self.consumed
            .lock()
            .unwrap()
            .retain(|(_, p)| p != project);
    }

    /// Observers that recorded a built state, in call order.
    pub fn remembered(&self) -> Vec<ConfigId> {
        self.remembered
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Projects recorded by `observer`'s last `remember_built_state`.
    pub fn remembered_projects(&self, observer: &ConfigId) -> Vec<String> {
        self.remembered
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == observer)
            .map(|(_, projects)| projects.clone())
            .unwrap_or_default()
    }
}

impl DeltaProvider for MockDeltaProvider {
    fn delta(&self, observer: &ConfigId, project: &str, kind: BuildKind) -> Option<ChangeSet> {
        if kind == BuildKind::Full {
            return None;
        }
        let key = (observer.clone(), project.to_string());
        if self.consumed.lock().unwrap().contains(&key) {
            return Some(ChangeSet::since(BaselineId(2)));
        }
        self.changes
            .lock()
            .unwrap()
            .get(project)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn remember_built_state(&self, observer: &ConfigId, projects: &[String]) -> Result<()> {
        let mut consumed = self.consumed.lock().unwrap();
        for project in projects {
            consumed.insert((observer.clone(), project.clone()));
        }
        self.remembered
            .lock()
            .unwrap()
            .push((observer.clone(), projects.to_vec()));
        Ok(())
    }
}

/// In-memory ledger recording removals.
#[derive(Default)]
pub struct MockLedger {
    states: Mutex<BTreeMap<ConfigId, BuildState>>,
    removed: Mutex<Vec<ConfigId>>,
}

impl MockLedger {
    pub fn removed(&self) -> Vec<ConfigId> {
        self.removed.lock().unwrap().clone()
    }
}

impl BuildStateLedger for MockLedger {
    fn get(&self, id: &ConfigId) -> Option<BuildState> {
        self.states.lock().unwrap().get(id).cloned()
    }

    fn replace(&self, id: &ConfigId, state: BuildState) -> Result<()> {
        self.states.lock().unwrap().insert(id.clone(), state);
        Ok(())
    }

    fn remove(&self, id: &ConfigId) -> Result<()> {
        self.states.lock().unwrap().remove(id);
        self.removed.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// Console sink capturing text per configuration.
#[derive(Default)]
pub struct RecordingConsole {
    lines: Mutex<BTreeMap<ConfigId, Vec<String>>>,
    cleared: Mutex<Vec<ConfigId>>,
}

impl RecordingConsole {
    /// Everything appended for `id`, newline-joined.
    pub fn text(&self, id: &ConfigId) -> String {
        self.lines
            .lock()
            .unwrap()
            .get(id)
            .map(|lines| lines.join("\n"))
            .unwrap_or_default()
    }

    /// Configurations whose markers were cleared, in call order.
    pub fn cleared(&self) -> Vec<ConfigId> {
        self.cleared.lock().unwrap().clone()
    }
}

impl ConsoleSink for RecordingConsole {
    fn append(&self, cfg: &ConfigId, text: &str) {
        self.lines
            .lock()
            .unwrap()
            .entry(cfg.clone())
            .or_default()
            .push(text.to_string());
    }

    fn clear_markers(&self, cfg: &ConfigId) {
        self.cleared.lock().unwrap().push(cfg.clone());
    }
}

#[derive(Default)]
struct GeneratorScript {
    calls: Mutex<Vec<String>>,
    results: Mutex<BTreeMap<ConfigId, MultiResult>>,
    failing_impact: Mutex<bool>,
    failing_post: Mutex<BTreeSet<ConfigId>>,
    unavailable: Mutex<BTreeSet<ConfigId>>,
}

impl GeneratorScript {
    fn record(&self, call: &str, cfg: &BuildConfiguration) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", call, cfg.id));
    }

    fn result(&self, cfg: &BuildConfiguration) -> MultiResult {
        self.results
            .lock()
            .unwrap()
            .get(&cfg.id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Generator provider whose generators record calls and return scripted
/// results.
///
/// Recorded calls read `"<operation> <project>/<configuration>"`, with
/// operations `analyze`, `regenerate`, `incremental`, `regenerate-deps`
/// and `deps`.
#[derive(Default, Clone)]
pub struct MockGeneratorProvider {
    script: Arc<GeneratorScript>,
}

impl MockGeneratorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `result` from generation for `id`.
    pub fn set_result(&self, id: &ConfigId, result: MultiResult) {
        self.script
            .results
            .lock()
            .unwrap()
            .insert(id.clone(), result);
    }

    /// Make impact analysis fail for every configuration.
    pub fn fail_impact_analysis(&self) {
        *self.script.failing_impact.lock().unwrap() = true;
    }

    /// Make post-build dependency generation fail for `id`.
    pub fn fail_post_generation(&self, id: &ConfigId) {
        self.script.failing_post.lock().unwrap().insert(id.clone());
    }

    /// Offer no generator for `id`.
    pub fn remove_generator(&self, id: &ConfigId) {
        self.script.unavailable.lock().unwrap().insert(id.clone());
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.calls.lock().unwrap().clone()
    }
}

struct MockGenerator {
    script: Arc<GeneratorScript>,
}

impl BuildFileGenerator for MockGenerator {
    fn analyze_impact(&self, cfg: &BuildConfiguration, _changes: Option<&ChangeSet>) -> Result<()> {
        self.script.record("analyze", cfg);
        if *self.script.failing_impact.lock().unwrap() {
            bail!("impact analysis failed");
        }
        Ok(())
    }

    fn regenerate_all(&self, cfg: &BuildConfiguration) -> MultiResult {
        self.script.record("regenerate", cfg);
        self.script.result(cfg)
    }

    fn generate_incremental(&self, cfg: &BuildConfiguration, _changes: &ChangeSet) -> MultiResult {
        self.script.record("incremental", cfg);
        self.script.result(cfg)
    }

    fn regenerate_dependencies(&self, cfg: &BuildConfiguration, _full: bool) -> Result<()> {
        self.script.record("regenerate-deps", cfg);
        if self.script.failing_post.lock().unwrap().contains(&cfg.id) {
            bail!("dependency generation failed");
        }
        Ok(())
    }

    fn generate_dependencies(&self, cfg: &BuildConfiguration) -> Result<()> {
        self.script.record("deps", cfg);
        if self.script.failing_post.lock().unwrap().contains(&cfg.id) {
            bail!("dependency generation failed");
        }
        Ok(())
    }
}

impl GeneratorProvider for MockGeneratorProvider {
    fn generator_for(&self, cfg: &BuildConfiguration) -> Option<Box<dyn BuildFileGenerator>> {
        if self.script.unavailable.lock().unwrap().contains(&cfg.id) {
            return None;
        }
        Some(Box::new(MockGenerator {
            script: self.script.clone(),
        }))
    }
}

/// Build runner recording invocations.
///
/// Successful builds write the configuration's artifact and cleans remove
/// it, so artifact-presence checks behave as with a real builder.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<(BuildKind, ConfigId)>>,
    errors: Mutex<BTreeMap<ConfigId, usize>>,
    clean_errors: Mutex<BTreeMap<ConfigId, usize>>,
    failing: Mutex<BTreeSet<ConfigId>>,
    cancel_on: Mutex<Option<(ConfigId, CancelToken)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `count` build errors for `id`.
    pub fn set_errors(&self, id: &ConfigId, count: usize) {
        self.errors.lock().unwrap().insert(id.clone(), count);
    }

    /// Report `count` errors when `id` is cleaned.
    pub fn set_clean_errors(&self, id: &ConfigId, count: usize) {
        self.clean_errors.lock().unwrap().insert(id.clone(), count);
    }

    /// Fail to invoke the builder of `id`.
    pub fn fail(&self, id: &ConfigId) {
        self.failing.lock().unwrap().insert(id.clone());
    }

    /// Cancel `token` while `id` is being built.
    pub fn cancel_during(&self, id: &ConfigId, token: CancelToken) {
        *self.cancel_on.lock().unwrap() = Some((id.clone(), token));
    }

    pub fn calls(&self) -> Vec<(BuildKind, ConfigId)> {
        self.calls.lock().unwrap().clone()
    }

    /// Configurations invoked with a non-clean kind, in order.
    pub fn built(&self) -> Vec<ConfigId> {
        self.calls()
            .into_iter()
            .filter(|(kind, _)| *kind != BuildKind::Clean)
            .map(|(_, id)| id)
            .collect()
    }

    /// Configurations cleaned, in order.
    pub fn cleaned(&self) -> Vec<ConfigId> {
        self.calls()
            .into_iter()
            .filter(|(kind, _)| *kind == BuildKind::Clean)
            .map(|(_, id)| id)
            .collect()
    }
}

impl BuildRunner for MockRunner {
    fn invoke(
        &self,
        kind: BuildKind,
        cfg: &BuildConfiguration,
        _console: &dyn ConsoleSink,
    ) -> Result<InvokeOutcome> {
        self.calls.lock().unwrap().push((kind, cfg.id.clone()));

        if let Some((ref id, ref token)) = *self.cancel_on.lock().unwrap() {
            if id == &cfg.id {
                token.cancel();
            }
        }
        if self.failing.lock().unwrap().contains(&cfg.id) {
            bail!("failed to spawn builder for `{}`", cfg.id);
        }

        if kind == BuildKind::Clean {
            let errors = self
                .clean_errors
                .lock()
                .unwrap()
                .get(&cfg.id)
                .copied()
                .unwrap_or(0);
            if errors == 0 {
                if let Some(ref artifact) = cfg.artifact {
                    let _ = std::fs::remove_file(artifact);
                }
            }
            return Ok(InvokeOutcome {
                is_clean: true,
                errors,
            });
        }

        let errors = self
            .errors
            .lock()
            .unwrap()
            .get(&cfg.id)
            .copied()
            .unwrap_or(0);
        if errors == 0 {
            if let Some(ref artifact) = cfg.artifact {
                if let Some(parent) = artifact.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(artifact, "artifact")?;
            }
        }
        Ok(InvokeOutcome {
            is_clean: false,
            errors,
        })
    }
}

/// A workspace fixture wired to a full set of mocks.
pub struct Harness {
    pub fixture: WorkspaceFixture,
    pub registry: Arc<MockRegistry>,
    pub deltas: Arc<MockDeltaProvider>,
    pub ledger: Arc<MockLedger>,
    pub generators: MockGeneratorProvider,
    pub runner: Arc<MockRunner>,
    pub console: Arc<RecordingConsole>,
    pub graph: Arc<DependencyGraph>,
    pub cancel: CancelToken,
}

impl Harness {
    /// Wire up `fixture` with every project's history unknown.
    pub fn new(fixture: WorkspaceFixture) -> Self {
        Self::with_deltas(fixture, MockDeltaProvider::unknown())
    }

    /// Wire up `fixture` with artifacts present and nothing changed.
    pub fn up_to_date(fixture: WorkspaceFixture) -> Self {
        fixture.create_artifacts();
        Self::with_deltas(fixture, MockDeltaProvider::unchanged())
    }

    fn with_deltas(fixture: WorkspaceFixture, deltas: MockDeltaProvider) -> Self {
        let graph = Arc::new(DependencyGraph::from_configurations(fixture.configs()));
        let registry = Arc::new(MockRegistry::new(fixture.configs().to_vec()));
        Harness {
            fixture,
            registry,
            deltas: Arc::new(deltas),
            ledger: Arc::new(MockLedger::default()),
            generators: MockGeneratorProvider::new(),
            runner: Arc::new(MockRunner::new()),
            console: Arc::new(RecordingConsole::default()),
            graph,
            cancel: CancelToken::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            registry: self.registry.clone(),
            deltas: self.deltas.clone(),
            ledger: self.ledger.clone(),
            generators: Arc::new(self.generators.clone()),
            runner: self.runner.clone(),
            console: self.console.clone(),
        }
    }

    pub fn orchestrator(&self) -> BuildOrchestrator {
        self.orchestrator_with(OrchestratorOptions::default())
    }

    pub fn orchestrator_with(&self, options: OrchestratorOptions) -> BuildOrchestrator {
        BuildOrchestrator::with_options(self.collaborators(), self.graph.clone(), options)
            .with_cancel_token(self.cancel.clone())
    }

    /// Current registry state of a configuration.
    pub fn cfg(&self, id: &str) -> BuildConfiguration {
        self.registry
            .get(&id.parse().expect("invalid configuration id"))
            .expect("unknown configuration")
    }

    /// Update a configuration in the registry.
    pub fn adjust(&self, id: &str, f: impl FnOnce(&mut BuildConfiguration)) {
        let mut cfg = self.cfg(id);
        f(&mut cfg);
        self.registry.set(cfg);
    }
}

/// Parse a list of configuration ids.
pub fn ids(list: &[&str]) -> BTreeSet<ConfigId> {
    list.iter()
        .map(|s| s.parse().expect("invalid configuration id"))
        .collect()
}

/// Parse one configuration id.
pub fn id(s: &str) -> ConfigId {
    s.parse().expect("invalid configuration id")
}
