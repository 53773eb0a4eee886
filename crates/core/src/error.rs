//! # Failure Taxonomy
//!
//! Typed failures a run can end with. Every one of them aborts the run;
//! the quality-driven retry in `graph::retry` is not an error path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::state::Field;

/// Kind of failure recorded in the run history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// A required input field was absent or empty before the stage ran
    MissingDependency,
    /// The stage worker returned an error
    StageExecutionError,
    /// The stage worker exceeded its deadline
    StageTimeout,
    /// The stage's patch failed write-set or structural validation
    StageInvalidOutput,
    /// Retry budget ran out and the exhaustion policy is `Fail`
    RetryBudgetExhausted,
    /// The run was cancelled between stages
    RunCancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingDependency => "MISSING_DEPENDENCY",
            FailureKind::StageExecutionError => "STAGE_EXECUTION_ERROR",
            FailureKind::StageTimeout => "STAGE_TIMEOUT",
            FailureKind::StageInvalidOutput => "STAGE_INVALID_OUTPUT",
            FailureKind::RetryBudgetExhausted => "RETRY_BUDGET_EXHAUSTED",
            FailureKind::RunCancelled => "RUN_CANCELLED",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a stage worker or raised around its invocation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageFailure {
    #[error("stage `{stage}` is missing required fields: {}", join_fields(.fields))]
    MissingDependency { stage: String, fields: Vec<Field> },
    #[error("stage `{stage}` failed: {reason}")]
    Execution { stage: String, reason: String },
    #[error("stage `{stage}` timed out after {}ms", .timeout.as_millis())]
    Timeout { stage: String, timeout: Duration },
    #[error("stage `{stage}` produced invalid output: {reason}")]
    InvalidOutput { stage: String, reason: String },
}

impl StageFailure {
    pub fn execution(stage: &str, reason: impl fmt::Display) -> Self {
        Self::Execution {
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_output(stage: &str, reason: impl fmt::Display) -> Self {
        Self::InvalidOutput {
            stage: stage.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StageFailure::MissingDependency { .. } => FailureKind::MissingDependency,
            StageFailure::Execution { .. } => FailureKind::StageExecutionError,
            StageFailure::Timeout { .. } => FailureKind::StageTimeout,
            StageFailure::InvalidOutput { .. } => FailureKind::StageInvalidOutput,
        }
    }

    pub fn stage(&self) -> &str {
        match self {
            StageFailure::MissingDependency { stage, .. }
            | StageFailure::Execution { stage, .. }
            | StageFailure::Timeout { stage, .. }
            | StageFailure::InvalidOutput { stage, .. } => stage,
        }
    }
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
