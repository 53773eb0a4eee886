//! # Meta-Critic Stage
//!
//! Audits the final design and its review for hallucination and bias.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::llm_helpers::{bullet_block, clamp_score, clean_list};
use super::prompts;
use crate::error::StageFailure;
use crate::graph::META_CRITIQUE;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Architecture, BiasReport, Critique, Field, Requirements, StatePatch};

/// Output from the meta-critic
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct MetaCriticOutput {
    /// Risk of hallucination or bias, 0.0-1.0
    pub bias_score: f64,
    /// One sentence per issue found
    #[serde(default)]
    pub findings: Vec<String>,
}

impl From<MetaCriticOutput> for BiasReport {
    fn from(output: MetaCriticOutput) -> Self {
        BiasReport {
            bias_score: clamp_score(output.bias_score, 1.0),
            findings: clean_list(output.findings),
        }
    }
}

fn meta_prompt(
    requirements: &Requirements,
    architecture: &Architecture,
    critique: &Critique,
) -> String {
    let mut prompt = format!("Architecture Design:\n{}\n", architecture.overview);
    for component in &architecture.components {
        prompt.push_str(&format!("- {}: {}\n", component.name, component.responsibility));
    }
    prompt.push_str("\nRequirements Context:\n");
    prompt.push_str(&bullet_block("Functional", &requirements.functional));
    prompt.push_str(&bullet_block("Non-functional", &requirements.non_functional));
    prompt.push_str(&format!(
        "\nCritic Review (score {:.1}/10):\n{}\n",
        critique.score, critique.feedback
    ));
    prompt
}

pub struct MetaCriticStage {
    config: ModelConfig,
}

impl MetaCriticStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn audit(&self, prompt: String) -> anyhow::Result<MetaCriticOutput> {
        run_llm_function!(&self.config, MetaCriticOutput, prompts::META_CRITIC, prompt)
    }
}

#[async_trait]
impl Stage for MetaCriticStage {
    fn name(&self) -> &'static str {
        META_CRITIQUE
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Requirements, Field::Architecture, Field::Critique]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::BiasReport]
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let prompt = meta_prompt(
            required(META_CRITIQUE, Field::Requirements, view.requirements())?,
            required(META_CRITIQUE, Field::Architecture, view.architecture())?,
            required(META_CRITIQUE, Field::Critique, view.critique())?,
        );

        let output = self
            .audit(prompt)
            .await
            .map_err(|e| StageFailure::execution(META_CRITIQUE, format!("{:#}", e)))?;

        Ok(StatePatch::new().with_bias_report(BiasReport::from(output)))
    }
}
