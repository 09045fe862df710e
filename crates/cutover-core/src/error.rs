//! Error types for Cutover Core
//!
//! Two layers:
//! - [`StageError`]: raised by a single stage body (I/O, parse, collaborator)
//! - [`CutoverError`]: raised by the executor when a run is aborted

use crate::result::RunResult;

/// Error raised from inside a stage's `execute`, `validate` or `rollback`
///
/// Collaborator crates provide `From` conversions into this type so stage
/// bodies can use `?` on any of them.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A stage decided it cannot continue
    #[error("{0}")]
    Failed(String),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON artifact
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by an external collaborator
    #[error("{collaborator}: {message}")]
    Collaborator {
        /// Which collaborator failed (data store, backup store, ...)
        collaborator: &'static str,
        /// Rendered collaborator error
        message: String,
    },
}

impl StageError {
    /// Create a plain failure
    #[inline]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap a collaborator error
    #[inline]
    pub fn collaborator(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Collaborator {
            collaborator,
            message: err.to_string(),
        }
    }
}

/// Error raised when a run stops before its last stage
#[derive(Debug, thiserror::Error)]
pub enum CutoverError {
    /// A forward phase failed validation or raised
    #[error("Migration failed at phase: {phase}")]
    PhaseFailed {
        /// Name of the failing phase
        phase: String,
        /// Why it failed
        reason: String,
        /// Records of every phase attempted so far
        result: Box<RunResult>,
    },

    /// A critical reverse step failed outside force mode
    #[error("Critical step failed: {step}: {reason}")]
    CriticalStepFailed {
        /// Name of the failing step
        step: String,
        /// Why it failed
        reason: String,
        /// Records of every step attempted so far
        result: Box<RunResult>,
    },
}

impl CutoverError {
    /// Name of the stage that aborted the run
    #[inline]
    #[must_use]
    pub fn stage(&self) -> &str {
        match self {
            Self::PhaseFailed { phase, .. } => phase,
            Self::CriticalStepFailed { step, .. } => step,
        }
    }

    /// Partial result accumulated before the abort
    #[inline]
    #[must_use]
    pub fn partial_result(&self) -> &RunResult {
        match self {
            Self::PhaseFailed { result, .. } | Self::CriticalStepFailed { result, .. } => result,
        }
    }

    /// Take ownership of the partial result
    #[must_use]
    pub fn into_partial_result(self) -> RunResult {
        match self {
            Self::PhaseFailed { result, .. } | Self::CriticalStepFailed { result, .. } => *result,
        }
    }
}
