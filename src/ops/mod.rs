//! High-level operations.
//!
//! This module contains the implementation of mbuild commands.

pub mod mbuild_build;
pub mod mbuild_plan;
pub mod mbuild_scan;
pub mod session;

pub use mbuild_build::{build, clean, BuildOptions, BuildSummary, CleanOptions};
pub use mbuild_plan::{format_plan, plan, PlanEntry, PlanOptions};
pub use mbuild_scan::{load_profiles, scan, ScanOptions};
pub use session::{open_orchestrator, request_context, SessionOverrides};
