//! Core data structures for mbuild.
//!
//! This module contains the foundational types used throughout mbuild:
//! - Configuration identity and settings
//! - Change sets observed between builds
//! - The configuration reference graph
//! - Manifests, the configuration registry and workspace management

pub mod change;
pub mod config_id;
pub mod configuration;
pub mod graph;
pub mod manifest;
pub mod registry;
pub mod workspace;

pub use change::{BaselineId, ChangeKind, ChangeRecord, ChangeSet};
pub use config_id::ConfigId;
pub use configuration::{ArtifactType, BuildConfiguration, BuildKind, BuilderSettings};
pub use graph::DependencyGraph;
pub use manifest::{Manifest, ManifestError, MANIFEST_NAME};
pub use registry::ConfigurationSet;
pub use workspace::{find_manifest, Workspace};
