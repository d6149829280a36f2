//! mbuild - incremental builds for workspaces of managed C/C++ projects
//!
//! This crate provides the core library functionality for mbuild,
//! including build decisions, orchestration, parallel scheduling and
//! scanner discovery of include paths and macros.

pub mod builder;
pub mod core;
pub mod ops;
pub mod scanner;
pub mod util;

/// Test utilities and mocks for mbuild unit tests.
///
/// This module is only available when compiling with `--cfg test`. It
/// provides mock collaborators for the orchestrator and workspace fixtures.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildOrchestrator, BuildState};
pub use core::{
    config_id::ConfigId, configuration::BuildConfiguration, manifest::Manifest,
    workspace::Workspace,
};
pub use util::context::GlobalContext;
