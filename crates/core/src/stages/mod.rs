//! # Stages
//!
//! The stage contract and the six LLM-backed workers of the default pipeline.

pub mod architect;
pub mod contract;
pub mod critic;
pub mod llm_helpers;
pub mod meta_critic;
pub mod planner;
pub mod prompts;
pub mod researcher;
pub mod visualizer;

use std::sync::Arc;

pub use architect::ArchitectStage;
pub use contract::{Stage, StateView};
pub use critic::CriticStage;
pub use meta_critic::MetaCriticStage;
pub use planner::PlannerStage;
pub use researcher::ResearcherStage;
pub use visualizer::VisualizerStage;

use crate::config::LabConfig;
use crate::graph::{
    standard_pipeline, GraphError, OrchestrationGraph, PipelineStages, ARCHITECT, CRITIQUE,
    META_CRITIQUE, PLAN, RESEARCH, VISUALIZE,
};

/// Wire the LLM workers into the standard graph, each with its resolved model
pub fn default_graph(config: &LabConfig) -> Result<OrchestrationGraph, GraphError> {
    standard_pipeline(PipelineStages {
        planner: Arc::new(PlannerStage::new(config.model_config_for(PLAN))),
        researcher: Arc::new(ResearcherStage::new(config.model_config_for(RESEARCH))),
        architect: Arc::new(ArchitectStage::new(config.model_config_for(ARCHITECT))),
        visualizer: Arc::new(VisualizerStage::new(config.model_config_for(VISUALIZE))),
        critic: Arc::new(CriticStage::new(config.model_config_for(CRITIQUE))),
        meta_critic: Arc::new(MetaCriticStage::new(config.model_config_for(META_CRITIQUE))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::state::Field;

    #[test]
    fn test_default_graph_wiring() {
        let graph = default_graph(&LabConfig::default()).unwrap();
        assert_eq!(graph.entry(), PLAN);
        assert_eq!(graph.len(), 6);
        assert!(matches!(
            graph.node(VISUALIZE).unwrap().edge,
            Edge::Next(CRITIQUE)
        ));
    }

    #[test]
    fn test_requirements_follow_dependency_order() {
        let graph = default_graph(&LabConfig::default()).unwrap();
        let requires = |name: &str| graph.node(name).unwrap().stage.requires().to_vec();

        assert_eq!(requires(RESEARCH), vec![Field::Requirements]);
        assert!(requires(ARCHITECT).contains(&Field::Research));
        assert_eq!(requires(VISUALIZE), vec![Field::Architecture]);
        assert!(requires(CRITIQUE).contains(&Field::Diagrams));
        assert!(requires(META_CRITIQUE).contains(&Field::Critique));
    }
}
