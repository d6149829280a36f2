//! Filesystem-backed delta provider.
//!
//! Change sets are computed by hashing a project tree and diffing it against
//! the snapshot the observing configuration stored in the ledger when it last
//! built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};

use crate::builder::collaborators::{BuildStateLedger, DeltaProvider};
use crate::builder::ledger::{BuildState, Snapshot};
use crate::core::{BaselineId, BuildKind, ChangeKind, ChangeRecord, ChangeSet, ConfigId};
use crate::util::fs;

/// Computes change sets from ledger snapshots.
pub struct SnapshotDeltaProvider {
    ledger: Arc<dyn BuildStateLedger>,
    project_roots: BTreeMap<String, PathBuf>,
    derived: Vec<Pattern>,
    reserved_names: Vec<String>,
}

impl SnapshotDeltaProvider {
    pub fn new(
        ledger: Arc<dyn BuildStateLedger>,
        project_roots: impl IntoIterator<Item = (String, PathBuf)>,
    ) -> Self {
        SnapshotDeltaProvider {
            ledger,
            project_roots: project_roots.into_iter().collect(),
            derived: Vec::new(),
            reserved_names: Vec::new(),
        }
    }

    /// Glob patterns (project-relative) marking derived files.
    pub fn with_derived_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.derived = fs::compile_patterns(patterns)?;
        Ok(self)
    }

    /// File names that are project metadata.
    pub fn with_reserved_names(mut self, names: &[String]) -> Self {
        self.reserved_names = names.to_vec();
        self
    }

    fn root(&self, project: &str) -> Result<&Path> {
        self.project_roots
            .get(project)
            .map(PathBuf::as_path)
            .with_context(|| format!("unknown project `{}`", project))
    }

    fn is_derived(&self, path: &Path) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.derived
            .iter()
            .any(|p| p.matches_path_with(path, options))
    }

    fn is_metadata(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.reserved_names.iter().any(|r| r == name))
    }

    fn record(&self, path: PathBuf, kind: ChangeKind) -> ChangeRecord {
        let derived = self.is_derived(&path);
        let metadata = self.is_metadata(&path);
        let mut record = ChangeRecord::new(path, kind);
        if derived {
            record = record.derived();
        }
        if metadata {
            record = record.metadata();
        }
        record
    }
}

impl DeltaProvider for SnapshotDeltaProvider {
    fn delta(&self, observer: &ConfigId, project: &str, kind: BuildKind) -> Option<ChangeSet> {
        if kind == BuildKind::Full {
            return None;
        }

        let state = self.ledger.get(observer)?;
        let previous = state.snapshots.get(project)?;
        let root = self.root(project).ok()?;

        let current = match Snapshot::capture(root) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("failed to snapshot `{}`: {:#}", project, e);
                return None;
            }
        };

        let changes = previous
            .diff(&current)
            .into_iter()
            .fold(ChangeSet::since(state.baseline), |set, (path, kind)| {
                set.with(self.record(path, kind))
            });
        tracing::debug!(
            "{} sees {} change(s) in `{}` since {}",
            observer,
            changes.len(),
            project,
            state.baseline
        );
        Some(changes)
    }

    fn remember_built_state(&self, observer: &ConfigId, projects: &[String]) -> Result<()> {
        let baseline = self
            .ledger
            .get(observer)
            .map(|s| s.baseline.next())
            .unwrap_or(BaselineId(1));

        let mut state = BuildState::new(baseline);
        for project in projects {
            let root = self.root(project)?;
            let snapshot = Snapshot::capture(root)
                .with_context(|| format!("failed to snapshot project `{}`", project))?;
            state.snapshots.insert(project.clone(), snapshot);
        }

        self.ledger.replace(observer, state)
    }
}
