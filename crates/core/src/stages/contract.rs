//! # Stage Contract
//!
//! Uniform interface every pipeline stage implements. A stage declares what it
//! reads and what it may write; the executor checks both sides.

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::StageFailure;
use crate::state::{
    Architecture, BiasReport, Critique, Field, LabState, Requirements, Research, StatePatch,
};

/// Read-only projection of [`LabState`] restricted to a stage's required fields
#[derive(Debug, Clone, Default)]
pub struct StateView {
    pub iteration: u32,
    query: Option<String>,
    requirements: Option<Requirements>,
    research: Option<Research>,
    architecture: Option<Architecture>,
    diagrams: Option<Vec<String>>,
    critique: Option<Critique>,
    bias_report: Option<BiasReport>,
}

impl StateView {
    /// Copy out only the `fields` a stage declared
    pub fn project(state: &LabState, fields: &[Field]) -> Self {
        let mut view = StateView {
            iteration: state.iteration_count,
            ..Default::default()
        };
        for field in fields {
            match field {
                Field::Query => view.query = Some(state.query.clone()),
                Field::Requirements => view.requirements = state.requirements.clone(),
                Field::Research => view.research = state.research.clone(),
                Field::Architecture => view.architecture = state.architecture.clone(),
                Field::Diagrams => view.diagrams = state.diagrams.clone(),
                Field::Critique => view.critique = state.critique.clone(),
                Field::BiasReport => view.bias_report = state.bias_report.clone(),
            }
        }
        view
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn requirements(&self) -> Option<&Requirements> {
        self.requirements.as_ref()
    }

    pub fn research(&self) -> Option<&Research> {
        self.research.as_ref()
    }

    pub fn architecture(&self) -> Option<&Architecture> {
        self.architecture.as_ref()
    }

    pub fn diagrams(&self) -> Option<&[String]> {
        self.diagrams.as_deref()
    }

    pub fn critique(&self) -> Option<&Critique> {
        self.critique.as_ref()
    }

    pub fn bias_report(&self) -> Option<&BiasReport> {
        self.bias_report.as_ref()
    }
}

/// A pipeline stage worker
///
/// `execute` is only called once the validator has confirmed every field in
/// `requires()` is present. The returned patch must write exactly the fields
/// in `writes()`.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name, also used as the graph node id
    fn name(&self) -> &'static str;

    /// Fields that must be present before the stage may run
    fn requires(&self) -> &'static [Field];

    /// Fields the stage's patch is allowed to write
    fn writes(&self) -> &'static [Field];

    /// Produce a patch, or fail. `deadline` is advisory for the worker;
    /// the executor enforces it regardless.
    async fn execute(&self, view: StateView, deadline: Instant) -> Result<StatePatch, StageFailure>;
}

/// Pull a required field out of a view, or report it as a missing dependency.
///
/// Only reachable when a stage reads a field it did not declare.
pub(crate) fn required<'a, T: ?Sized>(
    stage: &str,
    field: Field,
    value: Option<&'a T>,
) -> Result<&'a T, StageFailure> {
    value.ok_or_else(|| StageFailure::MissingDependency {
        stage: stage.to_string(),
        fields: vec![field],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_only_exposes_declared_fields() {
        let mut state = LabState::new("Design a chat system");
        state.requirements = Some(Requirements {
            functional: vec!["Send messages".to_string()],
            ..Default::default()
        });
        state.research = Some(Research {
            summary: "Use websockets".to_string(),
            ..Default::default()
        });

        let view = StateView::project(&state, &[Field::Requirements]);
        assert!(view.requirements().is_some());
        assert!(view.research().is_none());
        assert!(view.query().is_none());
    }

    #[test]
    fn test_required_reports_missing_field() {
        let view = StateView::default();
        let err = required("research", Field::Requirements, view.requirements()).unwrap_err();
        assert_eq!(
            err,
            StageFailure::MissingDependency {
                stage: "research".to_string(),
                fields: vec![Field::Requirements]
            }
        );
    }
}
