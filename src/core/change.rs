//! Filesystem change sets observed between builds.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Version of the snapshot a change set was computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineId(pub u64);

impl BaselineId {
    pub fn next(self) -> BaselineId {
        BaselineId(self.0 + 1)
    }
}

impl fmt::Display for BaselineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One changed file, relative to its project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: PathBuf,
    pub kind: ChangeKind,
    /// Generated/output file
    pub is_derived: bool,
    /// Project description rather than build input
    pub is_project_metadata: bool,
}

impl ChangeRecord {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        ChangeRecord {
            path: path.into(),
            kind,
            is_derived: false,
            is_project_metadata: false,
        }
    }

    pub fn derived(mut self) -> Self {
        self.is_derived = true;
        self
    }

    pub fn metadata(mut self) -> Self {
        self.is_project_metadata = true;
        self
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Changes observed in one project since a baseline.
///
/// A change set without a baseline has unknown history: nobody can say
/// what changed, so consumers must treat it as "everything changed".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    baseline: Option<BaselineId>,
    records: Vec<ChangeRecord>,
}

impl ChangeSet {
    /// A change set with unknown history.
    pub fn unknown() -> Self {
        ChangeSet::default()
    }

    /// An (initially empty) change set relative to a known baseline.
    pub fn since(baseline: BaselineId) -> Self {
        ChangeSet {
            baseline: Some(baseline),
            records: Vec::new(),
        }
    }

    pub fn with(mut self, record: ChangeRecord) -> Self {
        self.push(record);
        self
    }

    pub fn push(&mut self, record: ChangeRecord) {
        self.records.push(record);
    }

    pub fn baseline(&self) -> Option<BaselineId> {
        self.baseline
    }

    pub fn is_unknown(&self) -> bool {
        self.baseline.is_none()
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn contains_path(&self, path: &Path) -> bool {
        self.records.iter().any(|r| r.path == path)
    }

    /// Records in pre-order by path (parents before children, siblings sorted).
    pub fn sorted_records(&self) -> Vec<&ChangeRecord> {
        let mut records: Vec<&ChangeRecord> = self.records.iter().collect();
        records.sort_by(|a, b| a.path.components().cmp(b.path.components()));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_vs_empty() {
        assert!(ChangeSet::unknown().is_unknown());
        let empty = ChangeSet::since(BaselineId(3));
        assert!(!empty.is_unknown());
        assert!(empty.is_empty());
        assert_eq!(empty.baseline(), Some(BaselineId(3)));
    }

    #[test]
    fn test_sorted_records_is_preorder() {
        let set = ChangeSet::since(BaselineId(1))
            .with(ChangeRecord::new("src/net/sock.c", ChangeKind::Modified))
            .with(ChangeRecord::new("src-gen/a.c", ChangeKind::Added))
            .with(ChangeRecord::new("src/main.c", ChangeKind::Modified))
            .with(ChangeRecord::new("src", ChangeKind::Modified));

        let order: Vec<&Path> = set.sorted_records().iter().map(|r| r.path.as_path()).collect();
        assert_eq!(
            order,
            vec![
                Path::new("src"),
                Path::new("src/main.c"),
                Path::new("src/net/sock.c"),
                Path::new("src-gen/a.c"),
            ]
        );
    }

    #[test]
    fn test_baseline_next() {
        assert_eq!(BaselineId(4).next(), BaselineId(5));
        assert_eq!(BaselineId(4).to_string(), "#4");
    }
}
