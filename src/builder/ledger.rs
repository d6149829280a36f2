//! Build-state ledger - what each configuration last built against.
//!
//! For every configuration the ledger keeps a monotonically increasing
//! baseline id and, per observed project, a content snapshot taken when the
//! configuration last built successfully (or was found up to date). The
//! ledger is persisted as `.mbuild/ledger.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::collaborators::BuildStateLedger;
use crate::core::{BaselineId, ChangeKind, ConfigId};
use crate::util::context::STATE_DIR_NAME;
use crate::util::fs;
use crate::util::hash::sha256_file;

/// Directories never included in a snapshot.
pub const SNAPSHOT_SKIP_DIRS: &[&str] = &[STATE_DIR_NAME, ".git"];

/// Content hashes of every file below a project root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    files: BTreeMap<PathBuf, String>,
}

impl Snapshot {
    /// Hash every file below `root`. A missing root yields an empty snapshot.
    pub fn capture(root: &Path) -> Result<Snapshot> {
        if !root.exists() {
            return Ok(Snapshot::default());
        }

        let mut files = BTreeMap::new();
        for relative in fs::walk_files(root, SNAPSHOT_SKIP_DIRS)? {
            let hash = sha256_file(&root.join(&relative))?;
            files.insert(relative, hash);
        }
        Ok(Snapshot { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Files that differ between `self` (older) and `current`, sorted by path.
    pub fn diff(&self, current: &Snapshot) -> Vec<(PathBuf, ChangeKind)> {
        let mut changes = Vec::new();

        for (path, hash) in &current.files {
            match self.files.get(path) {
                None => changes.push((path.clone(), ChangeKind::Added)),
                Some(old) if old != hash => changes.push((path.clone(), ChangeKind::Modified)),
                Some(_) => {}
            }
        }
        for path in self.files.keys() {
            if !current.files.contains_key(path) {
                changes.push((path.clone(), ChangeKind::Removed));
            }
        }

        changes.sort_by(|a, b| a.0.cmp(&b.0));
        changes
    }
}

/// State recorded for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildState {
    pub baseline: BaselineId,

    /// Snapshot per observed project
    pub snapshots: BTreeMap<String, Snapshot>,
}

impl BuildState {
    pub fn new(baseline: BaselineId) -> Self {
        BuildState {
            baseline,
            snapshots: BTreeMap::new(),
        }
    }
}

/// On-disk ledger format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    states: BTreeMap<ConfigId, BuildState>,
}

const LEDGER_VERSION: u32 = 1;

/// JSON-file backed ledger.
#[derive(Debug)]
pub struct JsonLedger {
    /// None = in-memory only
    path: Option<PathBuf>,
    states: Mutex<BTreeMap<ConfigId, BuildState>>,
}

impl JsonLedger {
    /// Load the ledger at `path` (empty if the file doesn't exist).
    ///
    /// A ledger written by an incompatible version is discarded, which
    /// makes every configuration's history unknown.
    pub fn load(path: &Path) -> Result<Self> {
        let states = if path.exists() {
            let contents = fs::read_to_string(path)?;
            let file: LedgerFile = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse build ledger: {}", path.display()))?;
            if file.version == LEDGER_VERSION {
                file.states
            } else {
                tracing::warn!(
                    "ignoring build ledger version {} (expected {})",
                    file.version,
                    LEDGER_VERSION
                );
                BTreeMap::new()
            }
        } else {
            BTreeMap::new()
        };

        Ok(JsonLedger {
            path: Some(path.to_path_buf()),
            states: Mutex::new(states),
        })
    }

    pub fn in_memory() -> Self {
        JsonLedger {
            path: None,
            states: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<ConfigId, BuildState>>> {
        self.states
            .lock()
            .map_err(|_| anyhow!("build ledger lock poisoned"))
    }

    fn save(&self, states: &BTreeMap<ConfigId, BuildState>) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let file = LedgerFile {
            version: LEDGER_VERSION,
            states: states.clone(),
        };
        fs::write_string(path, &serde_json::to_string(&file)?)
    }
}

impl BuildStateLedger for JsonLedger {
    fn get(&self, id: &ConfigId) -> Option<BuildState> {
        self.lock().ok()?.get(id).cloned()
    }

    fn replace(&self, id: &ConfigId, state: BuildState) -> Result<()> {
        let mut states = self.lock()?;
        states.insert(id.clone(), state);
        self.save(&states)
    }

    fn remove(&self, id: &ConfigId) -> Result<()> {
        let mut states = self.lock()?;
        if states.remove(id).is_some() {
            self.save(&states)?;
        }
        Ok(())
    }
}
