//! Mbuild.toml manifest parsing and schema.
//!
//! The manifest lives at the workspace root and declares every project,
//! its configurations and how each configuration is built:
//!
//! ```toml
//! [workspace]
//! name = "demo"
//!
//! [env]
//! CC = "gcc"
//!
//! [[project]]
//! name = "app"
//! path = "app"
//!
//! [[project.configuration]]
//! name = "Debug"
//! artifact-type = "exe"
//! artifact = "build/Debug/app"
//! references = ["core/Debug"]
//!
//! [project.configuration.builder]
//! build = ["make", "-C", "build/Debug"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::core::{ArtifactType, BuildConfiguration, BuilderSettings, ConfigId};
use crate::util::fs;

/// Canonical manifest file name.
pub const MANIFEST_NAME: &str = "Mbuild.toml";

/// Manifest validation errors.
#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("could not find `Mbuild.toml` in `{}` or any parent directory", start.display())]
    #[diagnostic(
        code(mbuild::manifest::not_found),
        help("Create an `Mbuild.toml` at the workspace root or pass `--manifest-path`")
    )]
    NotFound { start: PathBuf },

    #[error("failed to parse {}: {message}", path.display())]
    #[diagnostic(code(mbuild::manifest::parse))]
    Parse { path: PathBuf, message: String },

    #[error("project `{name}` is declared more than once")]
    #[diagnostic(code(mbuild::manifest::duplicate_project))]
    DuplicateProject { name: String },

    #[error("invalid project name `{name}`")]
    #[diagnostic(
        code(mbuild::manifest::invalid_project_name),
        help("Project and configuration names must be non-empty and must not contain `/`")
    )]
    InvalidName { name: String },

    #[error("configuration `{id}` is declared more than once")]
    #[diagnostic(code(mbuild::manifest::duplicate_configuration))]
    DuplicateConfiguration { id: ConfigId },

    #[error("configuration `{from}` has an invalid reference: {message}")]
    #[diagnostic(code(mbuild::manifest::invalid_reference))]
    InvalidReference { from: ConfigId, message: String },

    #[error("configuration `{from}` references unknown configuration `{reference}`")]
    #[diagnostic(
        code(mbuild::manifest::unknown_reference),
        help("References are written `<project>/<configuration>`, or `<configuration>` within the same project")
    )]
    UnknownReference { from: ConfigId, reference: ConfigId },

    #[error("configuration `{id}` has build directory `{}` {problem}", build_dir.display())]
    #[diagnostic(
        code(mbuild::manifest::invalid_build_dir),
        help("The build directory must be a subdirectory of the project, separate from its sources, e.g. `build/Debug`")
    )]
    InvalidBuildDir {
        id: ConfigId,
        build_dir: PathBuf,
        problem: String,
    },
}

/// The parsed Mbuild.toml manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub workspace: WorkspaceMetadata,

    /// Environment shared by every builder process
    pub env: BTreeMap<String, String>,

    pub projects: Vec<ProjectManifest>,

    /// The directory containing this manifest
    pub manifest_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkspaceMetadata {
    #[serde(default)]
    pub name: Option<String>,
}

/// A `[[project]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectManifest {
    pub name: String,

    /// Project directory relative to the workspace root (defaults to the name)
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default, rename = "configuration")]
    pub configurations: Vec<ConfigurationManifest>,
}

/// A `[[project.configuration]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigurationManifest {
    pub name: String,

    #[serde(default)]
    pub artifact_type: ArtifactType,

    /// Project-relative artifact path
    #[serde(default)]
    pub artifact: Option<PathBuf>,

    /// Project-relative build directory (defaults to `build/<name>`)
    #[serde(default)]
    pub build_dir: Option<PathBuf>,

    /// Project-relative source folders (defaults to `["src"]`)
    #[serde(default)]
    pub sources: Option<Vec<PathBuf>>,

    #[serde(default)]
    pub references: Vec<String>,

    #[serde(default)]
    pub default: Option<bool>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub builder: BuilderSettings,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    workspace: WorkspaceMetadata,

    #[serde(default)]
    env: BTreeMap<String, String>,

    #[serde(default, rename = "project")]
    projects: Vec<ProjectManifest>,
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}

impl ProjectManifest {
    /// Absolute project root.
    pub fn root(&self, workspace_root: &Path) -> PathBuf {
        match &self.path {
            Some(path) => workspace_root.join(path),
            None => workspace_root.join(&self.name),
        }
    }
}

impl Manifest {
    /// Load a manifest from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Ok(Self::parse(&content, path)?)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;

        let manifest_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();

        let mut seen = BTreeSet::new();
        for project in &raw.projects {
            if !valid_name(&project.name) {
                return Err(ManifestError::InvalidName {
                    name: project.name.clone(),
                });
            }
            if !seen.insert(project.name.as_str()) {
                return Err(ManifestError::DuplicateProject {
                    name: project.name.clone(),
                });
            }
            for cfg in &project.configurations {
                if !valid_name(&cfg.name) {
                    return Err(ManifestError::InvalidName {
                        name: cfg.name.clone(),
                    });
                }
            }
        }

        Ok(Manifest {
            workspace: raw.workspace,
            env: raw.env,
            projects: raw.projects,
            manifest_dir,
        })
    }

    /// Workspace display name (falls back to the directory name).
    pub fn name(&self) -> String {
        self.workspace.name.clone().unwrap_or_else(|| {
            self.manifest_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workspace".to_string())
        })
    }

    pub fn project(&self, name: &str) -> Option<&ProjectManifest> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Expand every declared configuration into a `BuildConfiguration`.
    ///
    /// Paths become absolute and references are resolved and validated.
    /// Rebuild flags start cleared; persisted state is overlaid by the
    /// registry.
    pub fn configurations(&self) -> Result<Vec<BuildConfiguration>, ManifestError> {
        let mut configs = Vec::new();
        let mut ids = BTreeSet::new();

        for project in &self.projects {
            let root = project.root(&self.manifest_dir);
            for (index, raw) in project.configurations.iter().enumerate() {
                let id = ConfigId::new(&project.name, &raw.name);
                if !ids.insert(id.clone()) {
                    return Err(ManifestError::DuplicateConfiguration { id });
                }

                let mut references = Vec::new();
                for reference in &raw.references {
                    let reference = ConfigId::parse_reference(reference, &project.name)
                        .map_err(|message| ManifestError::InvalidReference {
                            from: id.clone(),
                            message,
                        })?;
                    references.push(reference);
                }

                let build_dir = fs::normalize(&root.join(
                    raw.build_dir
                        .clone()
                        .unwrap_or_else(|| PathBuf::from("build").join(&raw.name)),
                ));
                let sources: Vec<PathBuf> = raw
                    .sources
                    .clone()
                    .unwrap_or_else(|| vec![PathBuf::from("src")])
                    .into_iter()
                    .map(|s| fs::normalize(&root.join(s)))
                    .collect();
                check_build_dir(&id, &root, &build_dir, &sources)?;

                let mut env = self.env.clone();
                env.extend(raw.env.clone());

                configs.push(BuildConfiguration {
                    id,
                    artifact_type: raw.artifact_type,
                    artifact: raw.artifact.as_ref().map(|a| root.join(a)),
                    build_dir,
                    project_root: root.clone(),
                    sources,
                    references,
                    needs_rebuild: false,
                    needs_full_rebuild: false,
                    builder: raw.builder.clone(),
                    env,
                    // The first configuration is the default unless marked otherwise.
                    is_default: raw.default.unwrap_or(index == 0),
                });
            }
        }

        for cfg in &configs {
            for reference in &cfg.references {
                if !ids.contains(reference) {
                    return Err(ManifestError::UnknownReference {
                        from: cfg.id.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        Ok(configs)
    }
}

/// A build directory is removed wholesale on clean, so it must sit strictly
/// inside the project root and hold no sources.
fn check_build_dir(
    id: &ConfigId,
    root: &Path,
    build_dir: &Path,
    sources: &[PathBuf],
) -> Result<(), ManifestError> {
    let invalid = |problem: String| ManifestError::InvalidBuildDir {
        id: id.clone(),
        build_dir: build_dir.to_path_buf(),
        problem,
    };

    let root = fs::normalize(root);
    if root.starts_with(build_dir) {
        return Err(invalid("contains the project root".to_string()));
    }
    if !build_dir.starts_with(&root) {
        return Err(invalid(format!("is outside `{}`", root.display())));
    }
    if let Some(source) = sources.iter().find(|s| s.starts_with(build_dir)) {
        return Err(invalid(format!(
            "contains source folder `{}`",
            source.display()
        )));
    }
    Ok(())
}
