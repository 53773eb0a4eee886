//! # Critic Stage
//!
//! Scores the current design on seven criteria. Its score drives the only
//! conditional edge in the graph.

use std::collections::BTreeMap;

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::llm_helpers::{bullet_block, clamp_score};
use super::prompts;
use crate::error::StageFailure;
use crate::graph::CRITIQUE;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Architecture, Critique, Field, Requirements, Research, StatePatch};

pub const CRITERIA: [&str; 7] = [
    "completeness",
    "technical_soundness",
    "scalability",
    "security",
    "maintainability",
    "performance",
    "feasibility",
];

const MAX_SCORE: f64 = 10.0;

/// Output from the critic
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct CriticOutput {
    /// Overall quality, 0-10
    pub score: f64,
    /// Strengths, weaknesses and improvements
    pub feedback: String,
    pub completeness: f64,
    pub technical_soundness: f64,
    pub scalability: f64,
    pub security: f64,
    pub maintainability: f64,
    pub performance: f64,
    pub feasibility: f64,
}

impl CriticOutput {
    fn criteria(&self) -> [f64; 7] {
        [
            self.completeness,
            self.technical_soundness,
            self.scalability,
            self.security,
            self.maintainability,
            self.performance,
            self.feasibility,
        ]
    }
}

impl From<CriticOutput> for Critique {
    fn from(output: CriticOutput) -> Self {
        let breakdown: BTreeMap<String, f64> = CRITERIA
            .iter()
            .zip(output.criteria())
            .map(|(name, value)| (name.to_string(), clamp_score(value, MAX_SCORE)))
            .collect();

        Critique {
            score: clamp_score(output.score, MAX_SCORE),
            feedback: output.feedback.trim().to_string(),
            breakdown,
        }
    }
}

fn critic_prompt(
    requirements: &Requirements,
    research: &Research,
    architecture: &Architecture,
    diagrams: &[String],
) -> String {
    let mut prompt = String::from("Original Requirements:\n");
    prompt.push_str(&bullet_block("Functional", &requirements.functional));
    prompt.push_str(&bullet_block("Non-functional", &requirements.non_functional));
    prompt.push_str(&bullet_block("Constraints", &requirements.constraints));
    prompt.push_str(&bullet_block("Success criteria", &requirements.success_criteria));
    prompt.push_str(&format!("\nResearch Analysis:\n{}\n", research.summary));
    prompt.push_str(&format!("\nArchitecture Design:\n{}\n", architecture.overview));
    for component in &architecture.components {
        prompt.push_str(&format!("- {}: {}\n", component.name, component.responsibility));
    }
    for (heading, text) in [
        ("Data", &architecture.data),
        ("Infrastructure", &architecture.infrastructure),
        ("Security", &architecture.security),
        ("Observability", &architecture.observability),
    ] {
        if !text.is_empty() {
            prompt.push_str(&format!("\n{}:\n{}\n", heading, text));
        }
    }
    prompt.push_str(&format!("\nDiagrams provided: {}\n", diagrams.len()));
    prompt
}

pub struct CriticStage {
    config: ModelConfig,
}

impl CriticStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn review(&self, prompt: String) -> anyhow::Result<CriticOutput> {
        run_llm_function!(&self.config, CriticOutput, prompts::CRITIC, prompt)
    }
}

#[async_trait]
impl Stage for CriticStage {
    fn name(&self) -> &'static str {
        CRITIQUE
    }

    fn requires(&self) -> &'static [Field] {
        &[
            Field::Requirements,
            Field::Research,
            Field::Architecture,
            Field::Diagrams,
        ]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Critique]
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let prompt = critic_prompt(
            required(CRITIQUE, Field::Requirements, view.requirements())?,
            required(CRITIQUE, Field::Research, view.research())?,
            required(CRITIQUE, Field::Architecture, view.architecture())?,
            required(CRITIQUE, Field::Diagrams, view.diagrams())?,
        );

        let output = self
            .review(prompt)
            .await
            .map_err(|e| StageFailure::execution(CRITIQUE, format!("{:#}", e)))?;

        let critique = Critique::from(output);
        tracing::info!(score = critique.score, iteration = view.iteration, "Design scored");
        Ok(StatePatch::new().with_critique(critique))
    }
}
