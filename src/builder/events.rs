//! Build event types for JSON output.
//!
//! This module defines the JSON schema for machine-readable build output.
//! These events are emitted when using `--message-format=json`, one object
//! per line.
//!
//! # Event Types
//!
//! - `build-started`: A build pass began
//! - `config-decided`: The decision engine ruled on a configuration
//! - `config-finished`: A configuration's pass ended
//! - `build-output`: Text written by a builder or generator
//! - `diagnostic`: A warning or error message
//! - `build-progress`: Progress update during the pass
//! - `build-finished`: Build completed (success or failure)
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use serde::Serialize;

use crate::builder::decision::{Decision, Verdict};
use crate::core::{BuildKind, ConfigId};

/// A build event emitted during the build process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// Build started.
    #[serde(rename = "build-started")]
    BuildStarted {
        /// Requested build kind ("auto", "incremental", "full", "clean")
        kind: String,
        /// Number of configurations taking part
        configurations: u64,
        /// Number of projects taking part
        projects: u64,
    },

    /// A configuration was decided.
    #[serde(rename = "config-decided")]
    ConfigDecided {
        configuration: String,
        decision: Decision,
        /// Human-readable explanation
        detail: String,
    },

    /// A configuration's pass ended.
    #[serde(rename = "config-finished")]
    ConfigFinished {
        configuration: String,
        /// Outcome name, e.g. "built", "skipped", "postponed"
        outcome: String,
        success: bool,
    },

    /// Output of a build tool.
    #[serde(rename = "build-output")]
    BuildOutput { configuration: String, text: String },

    /// A generic diagnostic message.
    #[serde(rename = "diagnostic")]
    Diagnostic {
        /// Severity level ("error", "warning", "note")
        level: String,
        /// Message text
        message: String,
    },

    /// Build progress update.
    #[serde(rename = "build-progress")]
    Progress {
        /// Current progress count
        current: u64,
        /// Total count
        total: u64,
        /// Unit type (e.g. "projects")
        unit: String,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        /// Whether the build succeeded
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        /// Number of configurations built
        #[serde(skip_serializing_if = "Option::is_none")]
        built: Option<u64>,
    },
}

impl BuildEvent {
    /// Create a build started event.
    pub fn started(kind: BuildKind, configurations: usize, projects: usize) -> Self {
        BuildEvent::BuildStarted {
            kind: kind.as_str().to_string(),
            configurations: configurations as u64,
            projects: projects as u64,
        }
    }

    /// Create a decision event.
    pub fn decided(id: &ConfigId, verdict: &Verdict) -> Self {
        BuildEvent::ConfigDecided {
            configuration: id.to_string(),
            decision: verdict.decision,
            detail: verdict.reason.to_string(),
        }
    }

    /// Create a configuration finished event.
    pub fn config_finished(id: &ConfigId, outcome: impl Into<String>, success: bool) -> Self {
        BuildEvent::ConfigFinished {
            configuration: id.to_string(),
            outcome: outcome.into(),
            success,
        }
    }

    /// Create a build output event.
    pub fn output(id: &ConfigId, text: &str) -> Self {
        BuildEvent::BuildOutput {
            configuration: id.to_string(),
            text: text.to_string(),
        }
    }

    /// Create a diagnostic event.
    pub fn diagnostic(level: impl Into<String>, message: impl Into<String>) -> Self {
        BuildEvent::Diagnostic {
            level: level.into(),
            message: message.into(),
        }
    }

    /// Create a progress event.
    pub fn progress(current: u64, total: u64, unit: impl Into<String>) -> Self {
        BuildEvent::Progress {
            current,
            total,
            unit: unit.into(),
        }
    }

    /// Create a build finished event.
    pub fn finished(success: bool, duration_ms: u64) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            built: None,
        }
    }

    /// Attach the number of built configurations to a finished event.
    pub fn with_built(mut self, count: usize) -> Self {
        if let BuildEvent::BuildFinished { ref mut built, .. } = self {
            *built = Some(count as u64);
        }
        self
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
