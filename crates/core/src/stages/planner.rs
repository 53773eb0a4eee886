//! # Planner Stage
//!
//! Extracts structured requirements from the raw query.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::llm_helpers::clean_list;
use super::prompts;
use crate::error::StageFailure;
use crate::graph::PLAN;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Field, Requirements, StatePatch};

/// Output from the planner
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct PlannerOutput {
    /// What the system must do
    pub functional: Vec<String>,
    /// Performance, security, availability and scalability targets
    #[serde(default)]
    pub non_functional: Vec<String>,
    /// Technical, regulatory or budget limits
    #[serde(default)]
    pub constraints: Vec<String>,
    /// How a reviewer decides the design is adequate
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

impl From<PlannerOutput> for Requirements {
    fn from(output: PlannerOutput) -> Self {
        Requirements {
            functional: clean_list(output.functional),
            non_functional: clean_list(output.non_functional),
            constraints: clean_list(output.constraints),
            success_criteria: clean_list(output.success_criteria),
        }
    }
}

pub struct PlannerStage {
    config: ModelConfig,
}

impl PlannerStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn plan(&self, query: &str) -> anyhow::Result<PlannerOutput> {
        let prompt = format!("User Query:\n{}", query.trim());
        run_llm_function!(&self.config, PlannerOutput, prompts::PLANNER, prompt)
    }
}

#[async_trait]
impl Stage for PlannerStage {
    fn name(&self) -> &'static str {
        PLAN
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Query]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Requirements]
    }

    #[tracing::instrument(skip(self, view, _deadline), fields(model = %self.config.model))]
    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let query = required(PLAN, Field::Query, view.query())?;
        let output = self
            .plan(query)
            .await
            .map_err(|e| StageFailure::execution(PLAN, format!("{:#}", e)))?;

        let requirements = Requirements::from(output);
        tracing::debug!(
            functional = requirements.functional.len(),
            non_functional = requirements.non_functional.len(),
            "Requirements extracted"
        );
        Ok(StatePatch::new().with_requirements(requirements))
    }
}
