//! Project scheduling.
//!
//! Projects taking part in a request are grouped into waves: a project runs
//! once every project it references has run. Projects in the same wave are
//! passed to the orchestrator in parallel on a rayon pool, coordinated by
//! their scheduling rule: the exclusive rule takes the workspace write lock,
//! everything else a shared read lock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::builder::decision::BuildRequestContext;
use crate::builder::error::BuildError;
use crate::builder::orchestrator::{BuildOrchestrator, ProjectReport};
use crate::core::{BuildConfiguration, BuildKind, ConfigId, DependencyGraph};

/// Exclusivity a configuration's build requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SchedulingRule {
    /// May run alongside other projects
    None,
    /// Must have the whole workspace to itself
    Workspace,
}

/// The rule for building `cfg`.
///
/// Consuming another project's configuration, or running a managed builder
/// (which rewrites generated build files), requires the workspace rule.
pub fn scheduling_rule(cfg: &BuildConfiguration) -> SchedulingRule {
    let cross_project = cfg.references.iter().any(|r| r.project() != cfg.project());
    if cross_project || cfg.is_managed() {
        SchedulingRule::Workspace
    } else {
        SchedulingRule::None
    }
}

/// Group the projects of `building` into reference-ordered waves.
///
/// Projects caught in a reference cycle end up together in a final wave.
pub fn project_waves(building: &BTreeSet<ConfigId>, graph: &DependencyGraph) -> Vec<Vec<String>> {
    let projects: BTreeSet<String> = building.iter().map(|id| id.project().to_string()).collect();

    let mut pending: BTreeMap<String, BTreeSet<String>> = projects
        .iter()
        .map(|p| (p.clone(), BTreeSet::new()))
        .collect();
    for id in building {
        for reference in graph.direct_references(id) {
            let (from, to) = (id.project(), reference.project());
            if from != to && projects.contains(to) {
                if let Some(deps) = pending.get_mut(from) {
                    deps.insert(to.to_string());
                }
            }
        }
    }

    let mut waves = Vec::new();
    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(p, _)| p.clone())
            .collect();

        if ready.is_empty() {
            tracing::debug!("reference cycle between projects: {:?}", pending.keys());
            waves.push(pending.keys().cloned().collect());
            break;
        }

        for project in &ready {
            pending.remove(project);
        }
        for deps in pending.values_mut() {
            for project in &ready {
                deps.remove(project);
            }
        }
        waves.push(ready);
    }
    waves
}

/// Outcome of a scheduled pass over all participating projects.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub projects: Vec<ProjectReport>,
    /// Projects whose pass ended with a fatal error
    pub failures: Vec<(String, BuildError)>,
}

impl ScheduleReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.projects.iter().all(ProjectReport::is_success)
    }

    /// Every configuration built in the pass.
    pub fn built(&self) -> Vec<ConfigId> {
        self.projects.iter().flat_map(ProjectReport::built).collect()
    }
}

/// Runs project passes wave by wave.
pub struct ProjectScheduler {
    orchestrator: Arc<BuildOrchestrator>,
    pool: rayon::ThreadPool,
    workspace_lock: RwLock<()>,
}

impl ProjectScheduler {
    /// `jobs` bounds the number of projects built at once (None = one per CPU).
    pub fn new(orchestrator: Arc<BuildOrchestrator>, jobs: Option<usize>) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = jobs {
            builder = builder.num_threads(jobs.max(1));
        }
        let pool = builder
            .build()
            .context("failed to create build thread pool")?;

        Ok(ProjectScheduler {
            orchestrator,
            pool,
            workspace_lock: RwLock::new(()),
        })
    }

    fn rule_for(&self, project: &str, ctx: &BuildRequestContext) -> SchedulingRule {
        let registry = &self.orchestrator;
        registry
            .project_configurations(project, ctx)
            .iter()
            .filter_map(|id| registry.configuration(id))
            .map(|cfg| scheduling_rule(&cfg))
            .max()
            .unwrap_or(SchedulingRule::None)
    }

    fn run_project(
        &self,
        project: &str,
        kind: BuildKind,
        ctx: &BuildRequestContext,
    ) -> Result<ProjectReport, BuildError> {
        match self.rule_for(project, ctx) {
            SchedulingRule::Workspace => {
                let _guard = self
                    .workspace_lock
                    .write()
                    .unwrap_or_else(|e| e.into_inner());
                self.orchestrator.build_project(project, kind, ctx)
            }
            SchedulingRule::None => {
                let _guard = self
                    .workspace_lock
                    .read()
                    .unwrap_or_else(|e| e.into_inner());
                self.orchestrator.build_project(project, kind, ctx)
            }
        }
    }

    /// Build every project taking part in `ctx`.
    ///
    /// `on_project` is called as each project's pass ends. A fatal failure
    /// in one project is recorded and the others continue; cancellation
    /// ends the whole run with an error.
    pub fn run<F>(
        &self,
        kind: BuildKind,
        mut ctx: BuildRequestContext,
        on_project: F,
    ) -> Result<ScheduleReport, BuildError>
    where
        F: Fn(&str, &Result<ProjectReport, BuildError>) + Sync,
    {
        let mut report = ScheduleReport::default();

        for wave in project_waves(&ctx.building, self.orchestrator.graph()) {
            tracing::debug!("building wave: {}", wave.join(", "));

            let ctx_ref = &ctx;
            let results: Vec<(String, Result<ProjectReport, BuildError>)> =
                self.pool.install(|| {
                    wave.par_iter()
                        .map(|project| {
                            let result = self.run_project(project, kind, ctx_ref);
                            on_project(project, &result);
                            (project.clone(), result)
                        })
                        .collect()
                });

            let mut cancelled = None;
            for (project, result) in results {
                match result {
                    Ok(project_report) => {
                        for id in project_report.built() {
                            ctx.mark_built(id);
                        }
                        report.projects.push(project_report);
                    }
                    Err(e) if e.is_cancelled() => cancelled = Some(e),
                    Err(e) => report.failures.push((project, e)),
                }
            }
            if let Some(e) = cancelled {
                return Err(e);
            }
        }

        Ok(report)
    }
}
