//! Build configurations - one buildable variant of a project.
//!
//! A `BuildConfiguration` couples an artifact with the builder that
//! produces it and the rebuild-state flags the orchestrator maintains
//! across invocations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::ConfigId;
use crate::util::hash::Fingerprint;

/// What a configuration produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Executable binary
    #[default]
    #[serde(alias = "bin")]
    Exe,

    /// Shared/dynamic library (.so / .dylib / .dll)
    #[serde(alias = "dylib")]
    Shared,

    /// Static library (.a / .lib)
    #[serde(alias = "lib")]
    Static,

    /// Anything else (documentation, generated sources, ...)
    Other,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Exe => "exe",
            ArtifactType::Shared => "shared",
            ArtifactType::Static => "static",
            ArtifactType::Other => "other",
        }
    }
}

/// The kind of build being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    /// Triggered without an explicit selection; builds default configurations.
    #[default]
    Auto,
    Incremental,
    Full,
    Clean,
}

impl BuildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildKind::Auto => "auto",
            BuildKind::Incremental => "incremental",
            BuildKind::Full => "full",
            BuildKind::Clean => "clean",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(BuildKind::Auto),
            "incremental" => Ok(BuildKind::Incremental),
            "full" => Ok(BuildKind::Full),
            "clean" => Ok(BuildKind::Clean),
            _ => Err(format!(
                "invalid build kind '{}'; expected 'auto', 'incremental', 'full', or 'clean'",
                s
            )),
        }
    }
}

/// How a configuration's build is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuilderSettings {
    /// Build files are generated by tooling rather than hand-authored.
    pub managed: bool,

    /// The builder was replaced by a user-defined one.
    pub custom: bool,

    /// Whether the builder accepts per-configuration customisation.
    pub supports_customization: bool,

    /// Internal builders need no generated build files.
    pub internal: bool,

    /// Name of the configuration this builder belongs to (None = this one).
    pub owner: Option<String>,

    pub auto_build: bool,
    pub incremental_build: bool,
    pub full_build: bool,
    pub clean_build: bool,

    /// Command run for auto, incremental and full builds.
    pub build: Vec<String>,

    /// Command run for clean builds.
    pub clean: Vec<String>,

    /// Build-file generator command.
    pub generate: Vec<String>,

    /// Dependency-file generator command.
    pub dependencies: Vec<String>,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        BuilderSettings {
            managed: true,
            custom: false,
            supports_customization: true,
            internal: false,
            owner: None,
            auto_build: true,
            incremental_build: true,
            full_build: true,
            clean_build: true,
            build: Vec::new(),
            clean: Vec::new(),
            generate: Vec::new(),
            dependencies: Vec::new(),
        }
    }
}

impl BuilderSettings {
    /// Whether this builder runs for the given build kind.
    pub fn enabled_for(&self, kind: BuildKind) -> bool {
        match kind {
            BuildKind::Auto => self.auto_build,
            BuildKind::Incremental => self.incremental_build,
            BuildKind::Full => self.full_build,
            BuildKind::Clean => self.clean_build,
        }
    }

    /// Whether the builder is owned by a configuration other than `name`.
    pub fn owned_by_other(&self, name: &str) -> bool {
        self.owner.as_deref().is_some_and(|owner| owner != name)
    }
}

/// One buildable configuration of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConfiguration {
    pub id: ConfigId,

    pub artifact_type: ArtifactType,

    /// Absolute path of the produced artifact, if declared
    pub artifact: Option<PathBuf>,

    /// Absolute build output directory
    pub build_dir: PathBuf,

    /// Absolute project root
    pub project_root: PathBuf,

    /// Absolute source folders
    pub sources: Vec<PathBuf>,

    /// Configurations whose artifacts this one consumes
    pub references: Vec<ConfigId>,

    pub needs_rebuild: bool,
    pub needs_full_rebuild: bool,

    pub builder: BuilderSettings,

    /// Extra environment for builder processes
    pub env: BTreeMap<String, String>,

    /// Built by `Auto` requests
    pub is_default: bool,
}

impl BuildConfiguration {
    pub fn new(id: ConfigId, project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let build_dir = project_root.join("build").join(id.name());
        BuildConfiguration {
            id,
            artifact_type: ArtifactType::default(),
            artifact: None,
            build_dir,
            project_root,
            sources: Vec::new(),
            references: Vec::new(),
            needs_rebuild: false,
            needs_full_rebuild: false,
            builder: BuilderSettings::default(),
            env: BTreeMap::new(),
            is_default: true,
        }
    }

    pub fn with_artifact_type(mut self, artifact_type: ArtifactType) -> Self {
        self.artifact_type = artifact_type;
        self
    }

    /// Set the artifact path, relative to the project root.
    pub fn with_artifact(mut self, artifact: impl AsRef<Path>) -> Self {
        self.artifact = Some(self.project_root.join(artifact));
        self
    }

    pub fn with_reference(mut self, id: ConfigId) -> Self {
        self.references.push(id);
        self
    }

    pub fn project(&self) -> &str {
        self.id.project()
    }

    pub fn is_static_library(&self) -> bool {
        self.artifact_type == ArtifactType::Static
    }

    pub fn is_managed(&self) -> bool {
        self.builder.managed
    }

    /// Update both rebuild flags.
    ///
    /// `true` requests a rebuild; `false` marks the configuration as
    /// successfully rebuilt and clears both flags.
    pub fn set_rebuild_state(&mut self, rebuild: bool) {
        self.needs_rebuild = rebuild;
        if !rebuild {
            self.needs_full_rebuild = false;
        }
    }

    /// Artifact path relative to the project root.
    pub fn artifact_relative(&self) -> Option<PathBuf> {
        self.artifact
            .as_ref()
            .and_then(|p| p.strip_prefix(&self.project_root).ok())
            .map(Path::to_path_buf)
    }

    /// Build directory relative to the project root, if it lies inside it.
    pub fn build_dir_relative(&self) -> Option<PathBuf> {
        self.build_dir
            .strip_prefix(&self.project_root)
            .ok()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    /// Fingerprint over every declared setting that affects the build.
    ///
    /// Rebuild flags are excluded; a changed fingerprint is what sets them.
    pub fn settings_fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(self.artifact_type.as_str());
        fp.update_str(
            &self
                .artifact_relative()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        fp.update_path(&self.build_dir);

        let sources: Vec<String> = self
            .sources
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        fp.update_list(sources.iter().map(String::as_str));

        let references: Vec<String> = self.references.iter().map(|r| r.to_string()).collect();
        fp.update_list(references.iter().map(String::as_str));

        let b = &self.builder;
        fp.update_bool(b.managed)
            .update_bool(b.custom)
            .update_bool(b.internal);
        fp.update_list(b.build.iter().map(String::as_str));
        fp.update_list(b.clean.iter().map(String::as_str));
        fp.update_list(b.generate.iter().map(String::as_str));
        fp.update_list(b.dependencies.iter().map(String::as_str));

        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        fp.update_list(env.iter().map(String::as_str));

        fp.finish_short()
    }
}
