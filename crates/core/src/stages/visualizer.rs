//! # Visualizer Stage
//!
//! Renders the architecture as Mermaid diagram sources.

use async_trait::async_trait;
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::contract::{required, Stage, StateView};
use super::prompts;
use crate::error::StageFailure;
use crate::graph::VISUALIZE;
use crate::models::ModelConfig;
use crate::run_llm_function;
use crate::state::{Architecture, Field, StatePatch};

/// Output from the visualizer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct VisualizerOutput {
    /// Raw Mermaid sources, one per diagram
    pub diagrams: Vec<String>,
}

/// Strip a surrounding ```mermaid fence if the model added one anyway
fn strip_fence(source: &str) -> &str {
    let trimmed = source.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("mermaid").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn normalize(output: VisualizerOutput) -> Vec<String> {
    output
        .diagrams
        .iter()
        .map(|d| strip_fence(d))
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

fn visualizer_prompt(architecture: &Architecture) -> String {
    let mut prompt = format!("Architecture Design:\n{}\n", architecture.overview);
    if !architecture.components.is_empty() {
        prompt.push_str("\nComponents:\n");
        for component in &architecture.components {
            prompt.push_str(&format!("- {}: {}\n", component.name, component.responsibility));
        }
    }
    for (heading, text) in [
        ("Data", &architecture.data),
        ("Infrastructure", &architecture.infrastructure),
    ] {
        if !text.is_empty() {
            prompt.push_str(&format!("\n{}:\n{}\n", heading, text));
        }
    }
    prompt
}

pub struct VisualizerStage {
    config: ModelConfig,
}

impl VisualizerStage {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    async fn draw(&self, prompt: String) -> anyhow::Result<VisualizerOutput> {
        run_llm_function!(&self.config, VisualizerOutput, prompts::VISUALIZER, prompt)
    }
}

#[async_trait]
impl Stage for VisualizerStage {
    fn name(&self) -> &'static str {
        VISUALIZE
    }

    fn requires(&self) -> &'static [Field] {
        &[Field::Architecture]
    }

    fn writes(&self) -> &'static [Field] {
        &[Field::Diagrams]
    }

    async fn execute(&self, view: StateView, _deadline: Instant) -> Result<StatePatch, StageFailure> {
        let architecture = required(VISUALIZE, Field::Architecture, view.architecture())?;
        let output = self
            .draw(visualizer_prompt(architecture))
            .await
            .map_err(|e| StageFailure::execution(VISUALIZE, format!("{:#}", e)))?;

        let diagrams = normalize(output);
        if diagrams.is_empty() {
            return Err(StageFailure::invalid_output(VISUALIZE, "model returned no diagrams"));
        }
        Ok(StatePatch::new().with_diagrams(diagrams))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fences_stripped() {
        let output = VisualizerOutput {
            diagrams: vec![
                "```mermaid\ngraph TD\n  A --> B\n```".to_string(),
                "flowchart LR\n  X --> Y".to_string(),
                "   ".to_string(),
            ],
        };
        assert_eq!(
            normalize(output),
            vec![
                "graph TD\n  A --> B".to_string(),
                "flowchart LR\n  X --> Y".to_string()
            ]
        );
    }

    #[test]
    fn test_prompt_lists_components() {
        let architecture = Architecture {
            overview: "Two services.".to_string(),
            components: vec![crate::state::Component {
                name: "Api".to_string(),
                responsibility: "Serves clients".to_string(),
            }],
            ..Default::default()
        };
        let prompt = visualizer_prompt(&architecture);
        assert!(prompt.contains("- Api: Serves clients"));
        assert!(!prompt.contains("Infrastructure:"));
    }
}
