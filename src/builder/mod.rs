//! Incremental build orchestration.
//!
//! This module decides which configurations of a workspace need building,
//! drives their build-file generators and builders, and remembers what was
//! built so the next invocation can tell what changed.

pub mod cancel;
pub mod classify;
pub mod collaborators;
pub mod decision;
pub mod environment;
pub mod error;
pub mod events;
pub mod generator;
pub mod ledger;
pub mod orchestrator;
pub mod runner;
pub mod schedule;
pub mod snapshot;

pub use cancel::CancelToken;
pub use classify::{ChangeClassifier, Classification};
pub use collaborators::{
    BuildFileGenerator, BuildRunner, BuildStateLedger, ConfigurationRegistry, ConsoleSink,
    DeltaProvider, GeneratorProvider, InvokeOutcome, MultiResult, Severity, StatusCode,
};
pub use decision::{BuildDecisionEngine, BuildRequestContext, Decision, Reason, Verdict};
pub use environment::BuildEnvironment;
pub use error::BuildError;
pub use events::BuildEvent;
pub use generator::{CommandGenerator, CommandGeneratorProvider};
pub use ledger::{BuildState, JsonLedger, Snapshot};
pub use orchestrator::{
    BuildOrchestrator, Collaborators, ConfigOutcome, ConfigReport, OrchestratorOptions,
    ProjectReport,
};
pub use runner::CommandBuildRunner;
pub use schedule::{scheduling_rule, ProjectScheduler, ScheduleReport, SchedulingRule};
pub use snapshot::SnapshotDeltaProvider;
