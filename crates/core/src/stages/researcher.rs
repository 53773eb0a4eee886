//! # Researcher Stage
//!
//! Surveys technologies, challenges, patterns and scaling concerns for the
//! extracted requirements. Re-entered on every quality retry.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::llm_helpers::{bullet_block, clean_list};
use super::prompts;
use crate::error::StageFailure;
use crate::graph::RESEARCH;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Field, Requirements, Research, StatePatch};

/// Output from the researcher
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ResearchOutput {
    /// Recommended direction in one paragraph
    pub summary: String,
    /// Candidate technologies with their trade-offs
    #[serde(default)]
    pub technologies: Vec<String>,
    /// Known pitfalls and failure modes
    #[serde(default)]
    pub challenges: Vec<String>,
    /// Architectural and data-flow patterns that fit
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Bottlenecks and scaling strategies
    #[serde(default)]
    pub scalability: Vec<String>,
}

impl From<ResearchOutput> for Research {
    fn from(output: ResearchOutput) -> Self {
        Research {
            summary: output.summary.trim().to_string(),
            technologies: clean_list(output.technologies),
            challenges: clean_list(output.challenges),
            patterns: clean_list(output.patterns),
            scalability: clean_list(output.scalability),
        }
    }
}

/// Prompt body for one research pass
fn research_prompt(requirements: &Requirements, iteration: u32) -> String {
    let mut prompt = String::from("Requirements:\n");
    prompt.push_str(&bullet_block("Functional", &requirements.functional));
    prompt.push_str(&bullet_block("Non-functional", &requirements.non_functional));
    prompt.push_str(&bullet_block("Constraints", &requirements.constraints));
    prompt.push_str(&bullet_block("Success criteria", &requirements.success_criteria));
    if iteration > 0 {
        prompt.push_str(&format!(
            "\nThis is research pass {}. The previous design scored below the quality bar.\n",
            iteration + 1
        ));
    }
    prompt
}

pub struct ResearcherStage {
    config: ModelConfig,
}

impl ResearcherStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn survey(&self, prompt: String) -> anyhow::Result<ResearchOutput> {
        run_llm_function!(&self.config, ResearchOutput, prompts::RESEARCHER, prompt)
    }
}

#[async_trait]
impl Stage for ResearcherStage {
    fn name(&self) -> &'static str {
        RESEARCH
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Requirements]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Research]
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let requirements = required(RESEARCH, Field::Requirements, view.requirements())?;
        let prompt = research_prompt(requirements, view.iteration);

        tracing::debug!(iteration = view.iteration, "Researching");
        let output = self
            .survey(prompt)
            .await
            .map_err(|e| StageFailure::execution(RESEARCH, format!("{:#}", e)))?;

        Ok(StatePatch::new().with_research(Research::from(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements() -> Requirements {
        Requirements {
            functional: vec!["Send messages".to_string()],
            non_functional: vec!["10k concurrent users".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_first_pass_prompt() {
        let prompt = research_prompt(&requirements(), 0);
        assert!(prompt.contains("- Send messages"));
        assert!(prompt.contains("Constraints: (none)"));
        assert!(!prompt.contains("research pass"));
    }

    #[test]
    fn test_retry_pass_prompt() {
        let prompt = research_prompt(&requirements(), 2);
        assert!(prompt.contains("research pass 3"));
    }

    #[test]
    fn test_output_conversion() {
        let research = Research::from(ResearchOutput {
            summary: "  Use websockets.  ".to_string(),
            technologies: vec!["Phoenix".to_string(), " ".to_string()],
            challenges: vec![],
            patterns: vec![],
            scalability: vec![],
        });
        assert_eq!(research.summary, "Use websockets.");
        assert_eq!(research.technologies.len(), 1);
    }
}
