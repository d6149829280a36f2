//! Wiring the process-backed collaborators for a workspace.

use std::sync::Arc;

use anyhow::Result;

use crate::builder::cancel::CancelToken;
use crate::builder::decision::BuildRequestContext;
use crate::builder::environment::BuildEnvironment;
use crate::builder::generator::CommandGeneratorProvider;
use crate::builder::ledger::JsonLedger;
use crate::builder::orchestrator::{BuildOrchestrator, Collaborators, OrchestratorOptions};
use crate::builder::runner::CommandBuildRunner;
use crate::builder::snapshot::SnapshotDeltaProvider;
use crate::core::{BuildKind, Workspace};
use crate::util::{Config, Shell};

/// Command line overrides of configuration-file settings.
#[derive(Debug, Clone, Default)]
pub struct SessionOverrides {
    pub verbose: Option<bool>,
    pub check_resource_changes: Option<bool>,
}

/// Orchestrator options from config files, with command line overrides.
pub fn orchestrator_options(config: &Config, overrides: &SessionOverrides) -> OrchestratorOptions {
    OrchestratorOptions {
        verbose: overrides.verbose.unwrap_or_else(|| config.verbose()),
        check_resource_changes: overrides
            .check_resource_changes
            .unwrap_or_else(|| config.check_resource_changes()),
        reserved_names: config.reserved_names(),
    }
}

/// Build an orchestrator for `ws` whose console is `shell`.
pub fn open_orchestrator(
    ws: &Workspace,
    config: &Config,
    shell: Arc<Shell>,
    overrides: &SessionOverrides,
    cancel: CancelToken,
) -> Result<BuildOrchestrator> {
    let options = orchestrator_options(config, overrides);

    let ledger = Arc::new(JsonLedger::load(&ws.ledger_path())?);
    let deltas = SnapshotDeltaProvider::new(ledger.clone(), ws.project_roots())
        .with_derived_patterns(&config.derived_patterns())?
        .with_reserved_names(&options.reserved_names);

    let env = Arc::new(BuildEnvironment::new(ws.manifest().env.clone()));
    let collab = Collaborators {
        registry: ws.registry(),
        deltas: Arc::new(deltas),
        ledger,
        generators: Arc::new(CommandGeneratorProvider::new(env.clone())),
        runner: Arc::new(CommandBuildRunner::new(env)),
        console: shell,
    };

    Ok(BuildOrchestrator::with_options(collab, ws.graph(), options).with_cancel_token(cancel))
}

/// The request context for `selectors` (empty = the default configurations).
///
/// An automatic build with no selection requests nothing explicitly, so
/// unconsumed static libraries may be postponed; every other kind treats
/// the participating configurations as requested.
pub fn request_context(
    ws: &Workspace,
    kind: BuildKind,
    selectors: &[String],
) -> Result<BuildRequestContext> {
    let graph = ws.graph();
    if selectors.is_empty() {
        let defaults = ws.default_configurations();
        return Ok(if kind == BuildKind::Auto {
            BuildRequestContext::for_auto(&defaults, &graph)
        } else {
            BuildRequestContext::for_selection(defaults, &graph)
        });
    }
    Ok(BuildRequestContext::for_selection(
        ws.resolve_selection(selectors)?,
        &graph,
    ))
}
