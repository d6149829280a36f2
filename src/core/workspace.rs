//! Workspace - central configuration hub.
//!
//! A Workspace ties the manifest to the live configuration registry, the
//! reference graph and the `.mbuild` state directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::builder::collaborators::ConfigurationRegistry;
use crate::core::manifest::{ManifestError, MANIFEST_NAME};
use crate::core::{BuildConfiguration, ConfigId, ConfigurationSet, DependencyGraph, Manifest};
use crate::util::context::STATE_DIR_NAME;
use crate::util::diagnostic::ConfigurationNotFoundError;

/// Walk up from `start` until a directory containing `Mbuild.toml` is found.
pub fn find_manifest(start: &Path) -> Result<PathBuf, ManifestError> {
    start
        .ancestors()
        .map(|dir| dir.join(MANIFEST_NAME))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| ManifestError::NotFound {
            start: start.to_path_buf(),
        })
}

/// A loaded workspace.
#[derive(Debug)]
pub struct Workspace {
    manifest: Manifest,

    /// Workspace root directory
    root: PathBuf,

    registry: Arc<ConfigurationSet>,

    graph: Arc<DependencyGraph>,
}

impl Workspace {
    /// Load the workspace described by `manifest_path`.
    pub fn new(manifest_path: &Path) -> Result<Self> {
        let manifest = Manifest::load(manifest_path)?;
        let root = manifest.manifest_dir.clone();

        let configs = manifest.configurations()?;
        let graph = DependencyGraph::from_configurations(&configs);
        let state_path = root.join(STATE_DIR_NAME).join("configurations.json");
        let registry = ConfigurationSet::load(configs, &state_path)?;

        tracing::debug!(
            "loaded workspace `{}` with {} configurations",
            manifest.name(),
            graph.len()
        );

        Ok(Workspace {
            manifest,
            root,
            registry: Arc::new(registry),
            graph: Arc::new(graph),
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn name(&self) -> String {
        self.manifest.name()
    }

    /// Get the workspace root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the `.mbuild` state directory.
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir().join("ledger.json")
    }

    pub fn registry(&self) -> Arc<ConfigurationSet> {
        Arc::clone(&self.registry)
    }

    pub fn graph(&self) -> Arc<DependencyGraph> {
        Arc::clone(&self.graph)
    }

    pub fn configuration(&self, id: &ConfigId) -> Option<BuildConfiguration> {
        self.registry.get(id)
    }

    /// Project names, in manifest order.
    pub fn project_names(&self) -> Vec<String> {
        self.manifest.projects.iter().map(|p| p.name.clone()).collect()
    }

    /// Absolute root of every project.
    pub fn project_roots(&self) -> Vec<(String, PathBuf)> {
        self.manifest
            .projects
            .iter()
            .map(|p| (p.name.clone(), p.root(&self.root)))
            .collect()
    }

    /// Every default configuration.
    pub fn default_configurations(&self) -> BTreeSet<ConfigId> {
        self.registry
            .all()
            .into_iter()
            .filter(|c| c.is_default)
            .map(|c| c.id)
            .collect()
    }

    /// Resolve command line selectors to configuration ids.
    ///
    /// A selector is `<project>/<configuration>`, a project name (all of its
    /// configurations) or a configuration name (that configuration in every
    /// project declaring it).
    pub fn resolve_selection(&self, selectors: &[String]) -> Result<BTreeSet<ConfigId>> {
        let all = self.registry.list();
        let mut selected = BTreeSet::new();

        for selector in selectors {
            let matches: Vec<&ConfigId> = if let Ok(id) = selector.parse::<ConfigId>() {
                all.iter().filter(|c| **c == id).collect()
            } else {
                let by_project: Vec<&ConfigId> =
                    all.iter().filter(|c| c.project() == selector).collect();
                if by_project.is_empty() {
                    all.iter().filter(|c| c.name() == selector).collect()
                } else {
                    by_project
                }
            };

            if matches.is_empty() {
                return Err(ConfigurationNotFoundError {
                    selector: selector.clone(),
                }
                .into());
            }
            selected.extend(matches.into_iter().cloned());
        }

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_workspace(dir: &Path) -> PathBuf {
        let manifest_path = dir.join(MANIFEST_NAME);
        std::fs::write(
            &manifest_path,
            r#"
[workspace]
name = "testws"

[[project]]
name = "core"

[[project.configuration]]
name = "Debug"
artifact-type = "static"

[[project.configuration]]
name = "Release"
artifact-type = "static"

[[project]]
name = "app"

[[project.configuration]]
name = "Debug"
references = ["core/Debug"]
"#,
        )
        .unwrap();
        manifest_path
    }

    #[test]
    fn test_workspace_creation() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(&create_test_workspace(tmp.path())).unwrap();

        assert_eq!(ws.name(), "testws");
        assert_eq!(ws.project_names(), vec!["core", "app"]);
        assert!(ws.state_dir().join("configurations.json").exists());
        assert_eq!(
            ws.graph().direct_references(&ConfigId::new("app", "Debug")),
            BTreeSet::from([ConfigId::new("core", "Debug")])
        );
    }

    #[test]
    fn test_default_configurations() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(&create_test_workspace(tmp.path())).unwrap();
        assert_eq!(
            ws.default_configurations(),
            BTreeSet::from([ConfigId::new("core", "Debug"), ConfigId::new("app", "Debug")])
        );
    }

    #[test]
    fn test_resolve_selection() {
        let tmp = TempDir::new().unwrap();
        let ws = Workspace::new(&create_test_workspace(tmp.path())).unwrap();

        let by_project = ws.resolve_selection(&["core".into()]).unwrap();
        assert_eq!(by_project.len(), 2);

        let by_name = ws.resolve_selection(&["Debug".into()]).unwrap();
        assert_eq!(by_name.len(), 2);

        let exact = ws.resolve_selection(&["core/Release".into()]).unwrap();
        assert_eq!(exact, BTreeSet::from([ConfigId::new("core", "Release")]));

        let err = ws.resolve_selection(&["Profile".into()]).unwrap_err();
        assert!(err.to_string().contains("no configuration matches `Profile`"));
    }

    #[test]
    fn test_find_manifest_walks_up() {
        let tmp = TempDir::new().unwrap();
        create_test_workspace(tmp.path());
        let nested = tmp.path().join("core/src");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_manifest(&nested).unwrap(),
            tmp.path().join(MANIFEST_NAME)
        );
    }
}
