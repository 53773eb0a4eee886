//! # State Patches
//!
//! A patch is the delta a stage returns. The executor applies it with
//! [`apply`], which never mutates the prior state: it returns a new one.

use serde::{Deserialize, Serialize};

use super::lab_state::{
    Architecture, BiasReport, Critique, Field, LabState, Requirements, Research, RunStatus,
    StageRecord,
};

/// Fields a stage asks to write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Requirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research: Option<Research>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagrams: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<Critique>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bias_report: Option<BiasReport>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = Some(requirements);
        self
    }

    pub fn with_research(mut self, research: Research) -> Self {
        self.research = Some(research);
        self
    }

    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = Some(architecture);
        self
    }

    pub fn with_diagrams(mut self, diagrams: Vec<String>) -> Self {
        self.diagrams = Some(diagrams);
        self
    }

    pub fn with_critique(mut self, critique: Critique) -> Self {
        self.critique = Some(critique);
        self
    }

    pub fn with_bias_report(mut self, report: BiasReport) -> Self {
        self.bias_report = Some(report);
        self
    }

    /// Fields this patch touches
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        if self.requirements.is_some() {
            fields.push(Field::Requirements);
        }
        if self.research.is_some() {
            fields.push(Field::Research);
        }
        if self.architecture.is_some() {
            fields.push(Field::Architecture);
        }
        if self.diagrams.is_some() {
            fields.push(Field::Diagrams);
        }
        if self.critique.is_some() {
            fields.push(Field::Critique);
        }
        if self.bias_report.is_some() {
            fields.push(Field::BiasReport);
        }
        fields
    }

    /// Structural checks on the values carried by the patch
    fn check_values(&self) -> Result<(), PatchError> {
        if let Some(requirements) = &self.requirements {
            if requirements.is_empty() {
                return Err(PatchError::invalid(Field::Requirements, "no requirements"));
            }
        }
        if let Some(research) = &self.research {
            if research.summary.trim().is_empty() {
                return Err(PatchError::invalid(Field::Research, "summary is blank"));
            }
        }
        if let Some(architecture) = &self.architecture {
            if architecture.overview.trim().is_empty() {
                return Err(PatchError::invalid(
                    Field::Architecture,
                    "overview is blank",
                ));
            }
        }
        if let Some(diagrams) = &self.diagrams {
            if diagrams.is_empty() {
                return Err(PatchError::invalid(Field::Diagrams, "no diagrams"));
            }
            if diagrams.iter().any(|d| d.trim().is_empty()) {
                return Err(PatchError::invalid(Field::Diagrams, "blank diagram source"));
            }
        }
        if let Some(critique) = &self.critique {
            if !(0.0..=10.0).contains(&critique.score) {
                return Err(PatchError::invalid(
                    Field::Critique,
                    format!("score {} outside 0-10", critique.score),
                ));
            }
            if let Some((name, value)) = critique
                .breakdown
                .iter()
                .find(|(_, v)| !(0.0..=10.0).contains(*v))
            {
                return Err(PatchError::invalid(
                    Field::Critique,
                    format!("criterion `{}` score {} outside 0-10", name, value),
                ));
            }
        }
        if let Some(report) = &self.bias_report {
            if !(0.0..=1.0).contains(&report.bias_score) {
                return Err(PatchError::invalid(
                    Field::BiasReport,
                    format!("bias score {} outside 0-1", report.bias_score),
                ));
            }
        }
        Ok(())
    }
}

/// Why a patch was refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("stage `{stage}` may not write `{field}`")]
    OutsideWriteSet { stage: String, field: Field },
    #[error("stage `{stage}` did not produce `{field}`")]
    MissingOutput { stage: String, field: Field },
    #[error("invalid `{field}`: {reason}")]
    InvalidValue { field: Field, reason: String },
    #[error("run already finished")]
    Terminal,
}

impl PatchError {
    fn invalid(field: Field, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Apply `patch` from `stage` to `state`, returning the next state.
///
/// The patch may only touch fields listed in `writes` and must provide all
/// of them. Untouched fields carry over unchanged, and exactly one
/// successful history record is appended.
pub fn apply(
    state: &LabState,
    stage: &str,
    writes: &[Field],
    patch: StatePatch,
    duration_ms: u64,
) -> Result<LabState, PatchError> {
    if state.is_terminal() {
        return Err(PatchError::Terminal);
    }

    let touched = patch.fields();
    if let Some(field) = touched.iter().find(|f| !writes.contains(f)) {
        return Err(PatchError::OutsideWriteSet {
            stage: stage.to_string(),
            field: *field,
        });
    }
    if let Some(field) = writes.iter().find(|f| !touched.contains(f)) {
        return Err(PatchError::MissingOutput {
            stage: stage.to_string(),
            field: *field,
        });
    }
    patch.check_values()?;

    let mut next = state.clone();
    let StatePatch {
        requirements,
        research,
        architecture,
        diagrams,
        critique,
        bias_report,
    } = patch;

    if requirements.is_some() {
        next.requirements = requirements;
    }
    if research.is_some() {
        next.research = research;
    }
    if architecture.is_some() {
        next.architecture = architecture;
    }
    if diagrams.is_some() {
        next.diagrams = diagrams;
    }
    if critique.is_some() {
        next.critique = critique;
    }
    if bias_report.is_some() {
        next.bias_report = bias_report;
    }

    next.history.push(StageRecord::succeeded(
        stage,
        state.iteration_count,
        duration_ms,
    ));
    Ok(next)
}

/// Prepare a state for another research pass.
///
/// Increments `iteration_count` and clears every field the retry re-derives,
/// so nothing from the previous pass leaks into the next one.
pub fn begin_retry(state: &LabState) -> LabState {
    let mut next = state.clone();
    next.iteration_count += 1;
    next.research = None;
    next.architecture = None;
    next.diagrams = None;
    next.critique = None;
    next
}

/// Close a run as failed with its single failure record
pub fn fail(state: &LabState, record: StageRecord) -> LabState {
    let mut next = state.clone();
    next.history.push(record);
    next.status = RunStatus::Failed;
    next
}

/// Close a run as succeeded
pub fn succeed(state: &LabState) -> LabState {
    let mut next = state.clone();
    next.status = RunStatus::Succeeded;
    next
}
