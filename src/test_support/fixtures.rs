//! Test fixtures for common test scenarios.
//!
//! This module provides pre-built test data and fixture generators
//! for common testing patterns in mbuild.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::core::{ArtifactType, BuildConfiguration, ConfigId};

/// Fixture for a workspace of projects on disk.
///
/// Every configuration added gets a `src/` folder with one source file, a
/// build and a generate command, and an artifact at
/// `build/<configuration>/<project>`.
pub struct WorkspaceFixture {
    tmp: TempDir,
    configs: Vec<BuildConfiguration>,
}

impl WorkspaceFixture {
    /// Create an empty workspace in a fresh temporary directory.
    pub fn new() -> Self {
        WorkspaceFixture {
            tmp: TempDir::new().expect("failed to create temp dir"),
            configs: Vec::new(),
        }
    }

    /// Workspace root.
    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    /// Root of a project.
    pub fn project_root(&self, project: &str) -> PathBuf {
        self.root().join(project)
    }

    /// Add a configuration; `references` are `"<project>/<name>"` strings.
    pub fn add(
        &mut self,
        project: &str,
        name: &str,
        artifact_type: ArtifactType,
        references: &[&str],
    ) -> &mut BuildConfiguration {
        let root = self.project_root(project);
        self.write(&format!("{}/src/{}.c", project, project), "int x;\n");

        let mut cfg = references.iter().fold(
            BuildConfiguration::new(ConfigId::new(project, name), &root)
                .with_artifact_type(artifact_type)
                .with_artifact(format!("build/{}/{}", name, project)),
            |cfg, reference| {
                cfg.with_reference(reference.parse().expect("invalid reference in fixture"))
            },
        );
        cfg.sources = vec![root.join("src")];
        cfg.builder.build = vec!["make".into()];
        cfg.builder.generate = vec!["./configure".into()];

        self.configs.push(cfg);
        self.configs.last_mut().expect("just pushed")
    }

    /// Shorthand for an executable configuration named `Debug`.
    pub fn exe(&mut self, project: &str, references: &[&str]) -> &mut BuildConfiguration {
        self.add(project, "Debug", ArtifactType::Exe, references)
    }

    /// Shorthand for a static library configuration named `Debug`.
    pub fn static_lib(&mut self, project: &str, references: &[&str]) -> &mut BuildConfiguration {
        self.add(project, "Debug", ArtifactType::Static, references)
    }

    /// Write a file relative to the workspace root, creating parents.
    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture dir");
        }
        std::fs::write(path, contents).expect("failed to write fixture file");
    }

    /// Create the artifact of every configuration, as after a good build.
    pub fn create_artifacts(&self) {
        for cfg in &self.configs {
            if let Some(ref artifact) = cfg.artifact {
                std::fs::create_dir_all(artifact.parent().expect("artifact has a parent"))
                    .expect("failed to create artifact dir");
                std::fs::write(artifact, "artifact").expect("failed to write artifact");
            }
        }
    }

    pub fn configs(&self) -> &[BuildConfiguration] {
        &self.configs
    }

    pub fn project_roots(&self) -> BTreeMap<String, PathBuf> {
        self.configs
            .iter()
            .map(|c| (c.project().to_string(), c.project_root.clone()))
            .collect()
    }
}

impl Default for WorkspaceFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Manifest content generators.
pub mod manifests {
    /// A workspace with one static library `core` and one executable `app`
    /// referencing it, built by shell commands that touch their artifacts.
    pub fn app_and_core() -> String {
        r#"[workspace]
name = "demo"

[env]
GREETING = "hello"

[[project]]
name = "core"
path = "core"

[[project.configuration]]
name = "Debug"
artifact-type = "static"
artifact = "build/Debug/libcore.a"

[project.configuration.builder]
build = ["sh", "-c", "mkdir -p build/Debug && echo built >> build/Debug/log && touch build/Debug/libcore.a"]
generate = ["sh", "-c", "true"]

[[project]]
name = "app"
path = "app"

[[project.configuration]]
name = "Debug"
artifact-type = "exe"
artifact = "build/Debug/app"
references = ["core/Debug"]

[project.configuration.builder]
build = ["sh", "-c", "mkdir -p build/Debug && echo built >> build/Debug/log && touch build/Debug/app"]
generate = ["sh", "-c", "true"]
"#
        .to_string()
    }

    /// A single unmanaged project.
    pub fn unmanaged(name: &str) -> String {
        format!(
            r#"[workspace]
name = "{name}"

[[project]]
name = "{name}"
path = "."

[[project.configuration]]
name = "Debug"

[project.configuration.builder]
managed = false
build = ["sh", "-c", "true"]
"#
        )
    }
}

/// Sample build-output logs.
pub mod build_logs {
    /// A make log compiling two files of `app` with gcc.
    pub fn gcc_make_log() -> &'static str {
        "make: Entering directory '/ws/app'\n\
         gcc -c -I include -I/usr/local/include -DDEBUG=1 -DVERSION=\"1.0\" -o build/main.o src/main.c\n\
         gcc -c -Iinclude -UNDEBUG -o build/util.o src/util.c\n\
         ar rcs build/libapp.a build/main.o build/util.o\n\
         make: Leaving directory '/ws/app'\n"
    }
}
