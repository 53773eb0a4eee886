//! # Architect Stage
//!
//! Synthesizes a concrete architecture from requirements and research notes.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::llm_helpers::bullet_block;
use super::prompts;
use crate::error::StageFailure;
use crate::graph::ARCHITECT;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Architecture, Component, Field, Requirements, Research, StatePatch};

/// A component proposed by the architect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ComponentOutput {
    /// Short name, reused as a diagram label
    pub name: String,
    /// One-sentence responsibility
    pub responsibility: String,
}

/// Output from the architect
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct ArchitectOutput {
    /// High-level description and key decisions
    pub overview: String,
    /// Core components
    #[serde(default)]
    pub components: Vec<ComponentOutput>,
    /// Data models and storage strategy
    #[serde(default)]
    pub data: String,
    /// Deployment and scaling
    #[serde(default)]
    pub infrastructure: String,
    /// Authentication, authorization and data protection
    #[serde(default)]
    pub security: String,
    /// Logging, metrics and recovery
    #[serde(default)]
    pub observability: String,
}

impl From<ArchitectOutput> for Architecture {
    fn from(output: ArchitectOutput) -> Self {
        Architecture {
            overview: output.overview.trim().to_string(),
            components: output
                .components
                .into_iter()
                .filter(|c| !c.name.trim().is_empty())
                .map(|c| Component {
                    name: c.name.trim().to_string(),
                    responsibility: c.responsibility.trim().to_string(),
                })
                .collect(),
            data: output.data.trim().to_string(),
            infrastructure: output.infrastructure.trim().to_string(),
            security: output.security.trim().to_string(),
            observability: output.observability.trim().to_string(),
        }
    }
}

fn architect_prompt(requirements: &Requirements, research: &Research) -> String {
    let mut prompt = format!("Research Notes:\n{}\n\n", research.summary);
    prompt.push_str(&bullet_block("Technologies", &research.technologies));
    prompt.push_str(&bullet_block("Challenges", &research.challenges));
    prompt.push_str(&bullet_block("Patterns", &research.patterns));
    prompt.push_str(&bullet_block("Scalability", &research.scalability));
    prompt.push_str("\nRequirements Context:\n");
    prompt.push_str(&bullet_block("Functional", &requirements.functional));
    prompt.push_str(&bullet_block("Non-functional", &requirements.non_functional));
    prompt.push_str(&bullet_block("Constraints", &requirements.constraints));
    prompt
}

pub struct ArchitectStage {
    config: ModelConfig,
}

impl ArchitectStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn design(&self, prompt: String) -> anyhow::Result<ArchitectOutput> {
        run_llm_function!(&self.config, ArchitectOutput, prompts::ARCHITECT, prompt)
    }
}

#[async_trait]
impl Stage for ArchitectStage {
    fn name(&self) -> &'static str {
        ARCHITECT
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Requirements, Field::Research]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Architecture]
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let requirements = required(ARCHITECT, Field::Requirements, view.requirements())?;
        let research = required(ARCHITECT, Field::Research, view.research())?;

        let output = self
            .design(architect_prompt(requirements, research))
            .await
            .map_err(|e| StageFailure::execution(ARCHITECT, format!("{:#}", e)))?;

        let architecture = Architecture::from(output);
        tracing::debug!(components = architecture.components.len(), "Architecture drafted");
        Ok(StatePatch::new().with_architecture(architecture))
    }
}
