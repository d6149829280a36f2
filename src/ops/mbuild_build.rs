//! Implementation of `mbuild build` and `mbuild clean`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};

use crate::builder::cancel::CancelToken;
use crate::builder::error::BuildError;
use crate::builder::events::BuildEvent;
use crate::builder::orchestrator::{ConfigOutcome, ConfigReport, ProjectReport};
use crate::builder::schedule::{ProjectScheduler, ScheduleReport};
use crate::core::{BuildKind, Workspace};
use crate::ops::session::{open_orchestrator, request_context, SessionOverrides};
use crate::util::diagnostic;
use crate::util::shell::{format_duration, Progress, Status};
use crate::util::{Config, Shell};

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub kind: BuildKind,

    /// Configuration selectors (empty = default configurations)
    pub selectors: Vec<String>,

    /// Number of projects built in parallel
    pub jobs: Option<usize>,

    pub overrides: SessionOverrides,
}

/// Result of a build pass.
#[derive(Debug)]
pub struct BuildSummary {
    pub report: ScheduleReport,
    pub duration: Duration,
}

impl BuildSummary {
    pub fn count(&self, outcome: fn(&ConfigOutcome) -> bool) -> usize {
        self.report
            .projects
            .iter()
            .flat_map(|p| &p.configs)
            .filter(|c| outcome(&c.outcome))
            .count()
    }
}

fn report_config(shell: &Shell, progress: &Progress, cfg: &ConfigReport) {
    if let Some(ref verdict) = cfg.verdict {
        shell.event(&BuildEvent::decided(&cfg.id, verdict));
    }
    shell.event(&BuildEvent::config_finished(
        &cfg.id,
        cfg.outcome.as_str(),
        cfg.outcome.is_success(),
    ));

    let reason = cfg
        .verdict
        .as_ref()
        .map(|v| format!(" ({})", v.reason))
        .unwrap_or_default();
    match &cfg.outcome {
        ConfigOutcome::Built => progress.status(Status::Building, format!("{}{}", cfg.id, reason)),
        ConfigOutcome::Cleaned => progress.status(Status::Cleaned, &cfg.id),
        ConfigOutcome::Skipped => progress.status(Status::Skipped, format!("{}{}", cfg.id, reason)),
        ConfigOutcome::Postponed => {
            progress.status(Status::Postponed, format!("{}{}", cfg.id, reason))
        }
        ConfigOutcome::Disabled => progress.status(
            Status::Info,
            format!("{}: builder disabled for this build kind", cfg.id),
        ),
        ConfigOutcome::NoSources(msg) => shell.warn(format!("{}: {}", cfg.id, msg)),
        failed => {
            shell.error(format!("{}: {}", cfg.id, failed));
            if !shell.is_verbose() && !shell.is_json() {
                for line in shell.take_output(&cfg.id) {
                    eprintln!("  {}", line);
                }
            }
        }
    }
}

fn report_project(shell: &Shell, progress: &Mutex<Progress>, result: &Result<ProjectReport, BuildError>) {
    let mut progress = progress.lock().unwrap_or_else(|e| e.into_inner());
    if let Ok(report) = result {
        for cfg in &report.configs {
            report_config(shell, &progress, cfg);
        }
    }
    progress.inc(1);
}

fn emit_failure(shell: &Shell, error: &BuildError) {
    let diag = error.to_diagnostic();
    if shell.is_json() {
        shell.event(&BuildEvent::diagnostic(
            diag.severity.to_string(),
            diag.message.clone(),
        ));
    } else {
        diagnostic::emit(&diag, shell.use_color());
    }
}

/// Build (or clean) the selected configurations of the workspace.
pub fn build(
    ws: &Workspace,
    config: &Config,
    shell: Arc<Shell>,
    opts: &BuildOptions,
) -> Result<BuildSummary> {
    let start = Instant::now();
    let ctx = request_context(ws, opts.kind, &opts.selectors)?;
    if ctx.building.is_empty() {
        bail!("no configurations to build");
    }

    let orchestrator = open_orchestrator(
        ws,
        config,
        Arc::clone(&shell),
        &opts.overrides,
        CancelToken::new(),
    )?;
    orchestrator.check_builders(opts.kind, &ctx)?;

    let projects: BTreeSet<&str> = ctx.building.iter().map(|id| id.project()).collect();
    tracing::debug!(
        "{} build of {} configuration(s) in {} project(s)",
        opts.kind,
        ctx.building.len(),
        projects.len()
    );
    shell.event(&BuildEvent::started(
        opts.kind,
        ctx.building.len(),
        projects.len(),
    ));

    let progress = Mutex::new(shell.progress(projects.len() as u64, format!("{}", opts.kind)));
    let scheduler = ProjectScheduler::new(Arc::new(orchestrator), opts.jobs.or(config.build.jobs))?;
    let result = scheduler.run(opts.kind, ctx, |_, result| {
        report_project(&shell, &progress, result)
    });
    progress.lock().unwrap_or_else(|e| e.into_inner()).finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            emit_failure(&shell, &e);
            shell.event(&BuildEvent::finished(false, start.elapsed().as_millis() as u64));
            return Err(e.into());
        }
    };

    for (_, error) in &report.failures {
        emit_failure(&shell, error);
    }

    let summary = BuildSummary {
        report,
        duration: start.elapsed(),
    };
    let success = summary.report.is_success();
    let built = summary.report.built().len();
    shell.event(
        &BuildEvent::finished(success, summary.duration.as_millis() as u64).with_built(built),
    );

    if !success {
        let failed = summary.count(|o| !o.is_success()) + summary.report.failures.len();
        bail!("could not build {} configuration(s)", failed);
    }

    let verb = if opts.kind == BuildKind::Clean {
        "cleaned"
    } else {
        "built"
    };
    shell.status(
        Status::Finished,
        format!(
            "{} build: {} configuration(s) {} in {}",
            opts.kind,
            built,
            verb,
            format_duration(summary.duration)
        ),
    );
    Ok(summary)
}

/// Options for the clean command.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub selectors: Vec<String>,
    pub jobs: Option<usize>,
}

/// Clean the selected configurations.
///
/// Cleaning forgets their recorded build state, so the next build of each
/// one starts from scratch.
pub fn clean(
    ws: &Workspace,
    config: &Config,
    shell: Arc<Shell>,
    opts: &CleanOptions,
) -> Result<BuildSummary> {
    build(
        ws,
        config,
        shell,
        &BuildOptions {
            kind: BuildKind::Clean,
            selectors: opts.selectors.clone(),
            jobs: opts.jobs,
            overrides: SessionOverrides::default(),
        },
    )
}
