//! Change classification - does a change set warrant a build?

use std::path::PathBuf;

use crate::core::{BuildConfiguration, ChangeKind, ChangeRecord, ChangeSet};

/// Result of classifying a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// An interesting resource was removed; build files must be regenerated
    /// from scratch.
    pub full_rebuild_needed: bool,

    /// At least one change affects the build.
    pub any_change_interesting: bool,
}

impl Classification {
    /// The classification of a change set nobody can vouch for.
    pub fn everything() -> Self {
        Classification {
            full_rebuild_needed: false,
            any_change_interesting: true,
        }
    }
}

/// Separates changes that feed a build from derived output and metadata.
#[derive(Debug, Clone, Default)]
pub struct ChangeClassifier {
    reserved_names: Vec<String>,

    /// Project-relative build output directories
    output_dirs: Vec<PathBuf>,

    /// Project-relative artifact path, always interesting
    build_goal: Option<PathBuf>,
}

impl ChangeClassifier {
    pub fn new(reserved_names: &[String]) -> Self {
        ChangeClassifier {
            reserved_names: reserved_names.to_vec(),
            output_dirs: Vec::new(),
            build_goal: None,
        }
    }

    /// Classifier for changes in `cfg`'s project.
    ///
    /// The build directories of every configuration of that project count
    /// as output, so one configuration's build never triggers another's.
    pub fn for_configuration(
        cfg: &BuildConfiguration,
        project_configs: &[BuildConfiguration],
        reserved_names: &[String],
    ) -> Self {
        let mut classifier = ChangeClassifier::new(reserved_names)
            .with_output_dirs(
                project_configs
                    .iter()
                    .filter(|c| c.project() == cfg.project())
                    .filter_map(BuildConfiguration::build_dir_relative),
            )
            .with_build_goal(cfg.artifact_relative());
        if let Some(own) = cfg.build_dir_relative() {
            if !classifier.output_dirs.contains(&own) {
                classifier.output_dirs.push(own);
            }
        }
        classifier
    }

    pub fn with_output_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.output_dirs.extend(dirs);
        self
    }

    pub fn with_build_goal(mut self, goal: Option<PathBuf>) -> Self {
        self.build_goal = goal;
        self
    }

    /// Whether a single change affects the build.
    pub fn is_interesting(&self, record: &ChangeRecord) -> bool {
        if self.build_goal.as_ref() == Some(&record.path) {
            return true;
        }
        if record.is_derived || record.is_project_metadata {
            return false;
        }
        if let Some(name) = record.file_name() {
            if self.reserved_names.iter().any(|r| r == name) {
                return false;
            }
        }
        !self
            .output_dirs
            .iter()
            .any(|dir| record.path.starts_with(dir))
    }

    /// Classify a change set.
    ///
    /// `None` or a set with unknown history is interesting. Otherwise the
    /// records are walked in path pre-order, stopping once both signals
    /// are known.
    pub fn classify(&self, changes: Option<&ChangeSet>) -> Classification {
        let changes = match changes {
            Some(changes) if !changes.is_unknown() => changes,
            _ => return Classification::everything(),
        };

        let mut result = Classification::default();
        for record in changes.sorted_records() {
            if !self.is_interesting(record) {
                continue;
            }
            result.any_change_interesting = true;
            if record.kind == ChangeKind::Removed {
                result.full_rebuild_needed = true;
            }
            if result.any_change_interesting && result.full_rebuild_needed {
                break;
            }
        }
        result
    }
}
