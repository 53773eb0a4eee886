//! # Lab State
//!
//! The single document threaded through every stage of a run.
//! Stages never touch it directly: they return a [`StatePatch`](super::StatePatch)
//! and the executor applies it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::FailureKind;

/// A named slot of [`LabState`] that stages can require or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Query,
    Requirements,
    Research,
    Architecture,
    Diagrams,
    Critique,
    BiasReport,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Query => "query",
            Field::Requirements => "requirements",
            Field::Research => "research",
            Field::Architecture => "architecture",
            Field::Diagrams => "diagrams",
            Field::Critique => "critique",
            Field::BiasReport => "bias_report",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured requirements extracted by the planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    pub functional: Vec<String>,
    #[serde(default)]
    pub non_functional: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

impl Requirements {
    pub fn is_empty(&self) -> bool {
        self.functional.is_empty()
            && self.non_functional.is_empty()
            && self.constraints.is_empty()
            && self.success_criteria.is_empty()
    }
}

/// Technical research notes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Research {
    pub summary: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub scalability: Vec<String>,
}

/// One component of the proposed architecture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub responsibility: String,
}

/// The synthesized system architecture
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Architecture {
    pub overview: String,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub infrastructure: String,
    #[serde(default)]
    pub security: String,
    #[serde(default)]
    pub observability: String,
}

/// Quality review of the current architecture (score on a 0-10 scale)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub score: f64,
    pub feedback: String,
    /// Per-criterion scores, e.g. "security" -> 6.5
    #[serde(default)]
    pub breakdown: BTreeMap<String, f64>,
}

/// Hallucination and bias assessment (score on a 0-1 scale)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasReport {
    pub bias_score: f64,
    #[serde(default)]
    pub findings: Vec<String>,
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// How a single stage attempt ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StageOutcome {
    Succeeded,
    Failed { kind: FailureKind, message: String },
}

/// One entry of the run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    /// Stage (graph node) name
    pub stage: String,
    /// Value of `iteration_count` when the attempt ran
    pub iteration: u32,
    /// Wall time spent in the stage
    pub duration_ms: u64,
    pub outcome: StageOutcome,
}

impl StageRecord {
    pub fn succeeded(stage: &str, iteration: u32, duration_ms: u64) -> Self {
        Self {
            stage: stage.to_string(),
            iteration,
            duration_ms,
            outcome: StageOutcome::Succeeded,
        }
    }

    pub fn failed(
        stage: &str,
        iteration: u32,
        duration_ms: u64,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.to_string(),
            iteration,
            duration_ms,
            outcome: StageOutcome::Failed {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, StageOutcome::Failed { .. })
    }
}

/// The shared run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabState {
    pub query: String,
    pub requirements: Option<Requirements>,
    pub research: Option<Research>,
    pub architecture: Option<Architecture>,
    pub diagrams: Option<Vec<String>>,
    pub critique: Option<Critique>,
    pub bias_report: Option<BiasReport>,
    pub iteration_count: u32,
    /// Set when the critique gate advanced only because the retry budget ran out
    #[serde(default)]
    pub exhausted_retries: bool,
    pub history: Vec<StageRecord>,
    pub status: RunStatus,
}

impl LabState {
    /// Seed a fresh state for a query
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            requirements: None,
            research: None,
            architecture: None,
            diagrams: None,
            critique: None,
            bias_report: None,
            iteration_count: 0,
            exhausted_retries: false,
            history: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Whether a field holds a usable (present and non-empty) value
    pub fn has(&self, field: Field) -> bool {
        match field {
            Field::Query => !self.query.trim().is_empty(),
            Field::Requirements => self.requirements.as_ref().is_some_and(|r| !r.is_empty()),
            Field::Research => self
                .research
                .as_ref()
                .is_some_and(|r| !r.summary.trim().is_empty()),
            Field::Architecture => self
                .architecture
                .as_ref()
                .is_some_and(|a| !a.overview.trim().is_empty()),
            Field::Diagrams => self.diagrams.as_ref().is_some_and(|d| !d.is_empty()),
            Field::Critique => self.critique.is_some(),
            Field::BiasReport => self.bias_report.is_some(),
        }
    }

    /// Fields that currently hold a value, in dependency order
    pub fn populated(&self) -> Vec<Field> {
        [
            Field::Query,
            Field::Requirements,
            Field::Research,
            Field::Architecture,
            Field::Diagrams,
            Field::Critique,
            Field::BiasReport,
        ]
        .into_iter()
        .filter(|f| self.has(*f))
        .collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The failing history entry of a failed run
    pub fn failure(&self) -> Option<&StageRecord> {
        self.history.iter().rev().find(|r| r.is_failure())
    }
}
