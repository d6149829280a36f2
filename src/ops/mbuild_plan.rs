//! Implementation of `mbuild plan`.
//!
//! Runs the decision engine over the participating configurations without
//! invoking any tool, so users can see what a build would do and why.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::builder::cancel::CancelToken;
use crate::builder::decision::Decision;
use crate::core::{BuildKind, ConfigId, Workspace};
use crate::ops::session::{open_orchestrator, request_context, SessionOverrides};
use crate::util::{Config, Shell};

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub kind: BuildKind,
    pub selectors: Vec<String>,
    pub check_resource_changes: Option<bool>,
}

/// What a build would do with one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub configuration: ConfigId,
    /// None when the builder is disabled for the requested kind
    pub decision: Option<Decision>,
    pub reason: String,
}

/// Decide every participating configuration, references first.
pub fn plan(ws: &Workspace, config: &Config, opts: &PlanOptions) -> Result<Vec<PlanEntry>> {
    let ctx = request_context(ws, opts.kind, &opts.selectors)?;
    let overrides = SessionOverrides {
        verbose: None,
        check_resource_changes: opts.check_resource_changes,
    };
    let orchestrator = open_orchestrator(
        ws,
        config,
        Arc::new(Shell::default()),
        &overrides,
        CancelToken::new(),
    )?;

    let order = orchestrator.graph().build_order();
    let mut entries = Vec::new();
    for id in order.into_iter().filter(|id| ctx.building.contains(id)) {
        let Some(cfg) = ws.configuration(&id) else {
            continue;
        };
        if !cfg.builder.enabled_for(opts.kind) {
            entries.push(PlanEntry {
                configuration: id,
                decision: None,
                reason: format!("builder disabled for {} builds", opts.kind),
            });
            continue;
        }

        let entry = match orchestrator.evaluate(&cfg, opts.kind, &ctx) {
            Ok(verdict) => PlanEntry {
                configuration: id,
                decision: Some(verdict.decision),
                reason: verdict.reason.to_string(),
            },
            Err(e) => PlanEntry {
                configuration: id,
                decision: None,
                reason: e.to_string(),
            },
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Render plan entries as an aligned table.
pub fn format_plan(entries: &[PlanEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.configuration.to_string().len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for entry in entries {
        let decision = entry
            .decision
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{:<width$}  {:<8}  {}\n",
            entry.configuration.to_string(),
            decision,
            entry.reason,
            width = width
        ));
    }
    out
}
