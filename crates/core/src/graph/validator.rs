//! # Precondition Validator
//!
//! Runs before every stage invocation and names exactly which required
//! fields an upstream stage failed to deliver.

use crate::error::StageFailure;
use crate::stages::Stage;
use crate::state::{Field, LabState};

/// Required fields that were absent or empty
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stage `{stage}` is missing: {fields:?}")]
pub struct MissingFields {
    pub stage: String,
    pub fields: Vec<Field>,
}

impl From<MissingFields> for StageFailure {
    fn from(missing: MissingFields) -> Self {
        StageFailure::MissingDependency {
            stage: missing.stage,
            fields: missing.fields,
        }
    }
}

/// Check that `state` satisfies the stage's declared requirements
pub fn validate(state: &LabState, stage: &dyn Stage) -> Result<(), MissingFields> {
    check(state, stage.name(), stage.requires())
}

/// Same check, from a raw field list
pub fn check(state: &LabState, stage: &str, requires: &[Field]) -> Result<(), MissingFields> {
    let fields: Vec<Field> = requires
        .iter()
        .copied()
        .filter(|f| !state.has(*f))
        .collect();

    if fields.is_empty() {
        Ok(())
    } else {
        Err(MissingFields {
            stage: stage.to_string(),
            fields,
        })
    }
}
