//! # Analysis Report
//!
//! Reduces a terminal [`LabState`] to the response handed back to callers:
//! one markdown document plus the scores and run bookkeeping.

use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::state::{
    Architecture, BiasReport, Critique, LabState, Requirements, Research, RunStatus,
    StageOutcome, StageRecord,
};

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// Where and why a failed run stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub stage: String,
    pub kind: FailureKind,
    pub message: String,
}

/// External response of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub final_markdown: String,
    pub critic_score: Option<f64>,
    pub bias_score: Option<f64>,
    pub iteration_count: u32,
    pub status: RunStatus,
    pub exhausted_retries: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    pub history: Vec<StageRecord>,
}

impl AnalysisReport {
    pub fn from_state(state: &LabState) -> Self {
        let failure = match state.status {
            RunStatus::Failed => state.failure().and_then(failure_info),
            _ => None,
        };

        Self {
            final_markdown: render_markdown(state),
            critic_score: state.critique.as_ref().map(|c| c.score),
            bias_score: state.bias_report.as_ref().map(|b| b.bias_score),
            iteration_count: state.iteration_count,
            status: state.status,
            exhausted_retries: state.exhausted_retries,
            failure,
            history: state.history.clone(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

impl From<&LabState> for AnalysisReport {
    fn from(state: &LabState) -> Self {
        Self::from_state(state)
    }
}

fn failure_info(record: &StageRecord) -> Option<FailureInfo> {
    match &record.outcome {
        StageOutcome::Failed { kind, message } => Some(FailureInfo {
            stage: record.stage.clone(),
            kind: *kind,
            message: message.clone(),
        }),
        StageOutcome::Succeeded => None,
    }
}

/// Join every populated section; empty when nothing has been produced yet
pub fn render_markdown(state: &LabState) -> String {
    let mut sections = Vec::new();

    if let Some(requirements) = &state.requirements {
        sections.push(requirements_section(requirements));
    }
    if let Some(research) = &state.research {
        sections.push(research_section(research));
    }
    if let Some(architecture) = &state.architecture {
        sections.push(architecture_section(architecture));
    }
    if let Some(diagrams) = state.diagrams.as_deref().filter(|d| !d.is_empty()) {
        sections.push(diagrams_section(diagrams));
    }
    if let Some(evaluation) = evaluation_section(
        state.critique.as_ref(),
        state.bias_report.as_ref(),
        state.exhausted_retries,
    ) {
        sections.push(evaluation);
    }

    sections.join(SECTION_SEPARATOR)
}

fn push_list(out: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n", heading));
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
}

fn push_paragraph(out: &mut String, heading: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    out.push_str(&format!("\n## {}\n{}\n", heading, text.trim()));
}

fn requirements_section(requirements: &Requirements) -> String {
    let mut out = String::from("# Requirements\n");
    push_list(&mut out, "Functional", &requirements.functional);
    push_list(&mut out, "Non-Functional", &requirements.non_functional);
    push_list(&mut out, "Constraints", &requirements.constraints);
    push_list(&mut out, "Success Criteria", &requirements.success_criteria);
    out.trim_end().to_string()
}

fn research_section(research: &Research) -> String {
    let mut out = format!("# Research Notes\n{}\n", research.summary.trim());
    push_list(&mut out, "Technologies", &research.technologies);
    push_list(&mut out, "Challenges", &research.challenges);
    push_list(&mut out, "Patterns", &research.patterns);
    push_list(&mut out, "Scalability", &research.scalability);
    out.trim_end().to_string()
}

fn architecture_section(architecture: &Architecture) -> String {
    let mut out = format!("# Architecture Design\n{}\n", architecture.overview.trim());
    if !architecture.components.is_empty() {
        out.push_str("\n## Components\n");
        for component in &architecture.components {
            out.push_str(&format!(
                "- **{}**: {}\n",
                component.name, component.responsibility
            ));
        }
    }
    push_paragraph(&mut out, "Data", &architecture.data);
    push_paragraph(&mut out, "Infrastructure", &architecture.infrastructure);
    push_paragraph(&mut out, "Security", &architecture.security);
    push_paragraph(&mut out, "Observability", &architecture.observability);
    out.trim_end().to_string()
}

fn diagrams_section(diagrams: &[String]) -> String {
    let blocks: Vec<String> = diagrams
        .iter()
        .map(|d| format!("```mermaid\n{}\n```", d.trim()))
        .collect();
    format!("# Diagrams\n{}", blocks.join("\n\n"))
}

fn evaluation_section(
    critique: Option<&Critique>,
    bias: Option<&BiasReport>,
    exhausted_retries: bool,
) -> Option<String> {
    let mut lines = Vec::new();

    if let Some(critique) = critique {
        lines.push(format!("**Score:** {:.1}/10", critique.score));
        if !critique.feedback.trim().is_empty() {
            lines.push(format!("**Feedback:** {}", critique.feedback.trim()));
        }
        for (criterion, score) in &critique.breakdown {
            lines.push(format!("- {}: {:.1}", criterion.replace('_', " "), score));
        }
    }
    if let Some(bias) = bias {
        lines.push(format!("**Bias Risk:** {:.2}", bias.bias_score));
        for finding in &bias.findings {
            lines.push(format!("- {}", finding));
        }
    }
    if exhausted_retries {
        lines.push(
            "_Best effort: the quality score stayed below the threshold after all retries._"
                .to_string(),
        );
    }

    if lines.is_empty() {
        None
    } else {
        Some(format!("# Evaluation\n{}", lines.join("\n")))
    }
}
