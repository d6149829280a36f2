//! Build error types and diagnostics.

use thiserror::Error;

use crate::core::ConfigId;
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error that stops a configuration or a whole project pass.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration's builder cannot be used as configured.
    #[error("builder of `{id}` cannot be used: {reason}")]
    BuilderCheck { id: ConfigId, reason: String },

    /// The build was cancelled; `id` is the configuration that was interrupted.
    #[error("build cancelled while processing `{id}`")]
    Cancelled { id: ConfigId },

    /// The builder could not be run, or post-build generation failed.
    #[error("failed to build `{id}`")]
    Invocation {
        id: ConfigId,
        #[source]
        source: anyhow::Error,
    },

    /// State could not be read or persisted.
    #[error("failed to update build state for `{id}`")]
    State {
        id: ConfigId,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    /// The configuration the error is about.
    pub fn configuration(&self) -> &ConfigId {
        match self {
            BuildError::BuilderCheck { id, .. }
            | BuildError::Cancelled { id }
            | BuildError::Invocation { id, .. }
            | BuildError::State { id, .. } => id,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildError::Cancelled { .. })
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            BuildError::BuilderCheck { id, reason } => {
                Diagnostic::error(format!("builder of `{}` cannot be used", id))
                    .with_context(reason.clone())
                    .with_suggestion(
                        "Enable `supports-customization` for the builder or remove the custom builder",
                    )
            }
            BuildError::Cancelled { id } => Diagnostic::warning(format!(
                "build cancelled while processing `{}`",
                id
            ))
            .with_context("the configuration will be rebuilt on the next invocation"),
            BuildError::Invocation { id, source } => {
                Diagnostic::error(format!("failed to build `{}`", id))
                    .with_context(format!("{:#}", source))
                    .with_suggestion(suggestions::BUILD_FAILED)
            }
            BuildError::State { id, source } => {
                Diagnostic::error(format!("failed to update build state for `{}`", id))
                    .with_context(format!("{:#}", source))
                    .with_suggestion(suggestions::STALE_STATE)
            }
        }
    }
}
