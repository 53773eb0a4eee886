//! # Orchestration Graph
//!
//! The pipeline as data: a table of node -> (stage, outgoing edge).
//! The executor only ever reads this table, so another pipeline is just
//! another table.
//!
//! ```text
//! plan → research → architect → visualize → critique ─┬─▶ meta_critique → DONE
//!            ▲                                         │
//!            └──────────────── retry ──────────────────┘
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::retry::{critique_gate, Decision, RetryPolicy};
use crate::stages::Stage;
use crate::state::LabState;

pub const PLAN: &str = "plan";
pub const RESEARCH: &str = "research";
pub const ARCHITECT: &str = "architect";
pub const VISUALIZE: &str = "visualize";
pub const CRITIQUE: &str = "critique";
pub const META_CRITIQUE: &str = "meta_critique";

/// Branch function evaluated on a conditional edge
pub type BranchFn = fn(&LabState, &RetryPolicy) -> Decision;

/// Outgoing edge of a node
#[derive(Clone, Copy)]
pub enum Edge {
    /// Unconditional successor
    Next(&'static str),
    /// Conditional edge: `decide` picks `retry` or `advance`
    Branch {
        decide: BranchFn,
        retry: &'static str,
        advance: &'static str,
    },
    /// Terminal success
    Done,
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Next(next) => write!(f, "Next({})", next),
            Edge::Branch { retry, advance, .. } => {
                write!(f, "Branch(retry: {}, advance: {})", retry, advance)
            }
            Edge::Done => f.write_str("Done"),
        }
    }
}

impl Edge {
    fn targets(&self) -> Vec<&'static str> {
        match self {
            Edge::Next(next) => vec![*next],
            Edge::Branch { retry, advance, .. } => vec![*retry, *advance],
            Edge::Done => vec![],
        }
    }
}

/// A node of the graph
#[derive(Clone)]
pub struct GraphNode {
    pub stage: Arc<dyn Stage>,
    pub edge: Edge,
}

/// Errors raised while assembling a graph
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("graph has no entry node")]
    MissingEntry,
    #[error("entry node `{0}` is not registered")]
    UnknownEntry(String),
    #[error("node `{0}` registered twice")]
    DuplicateNode(String),
    #[error("edge from `{from}` targets unknown node `{to}`")]
    UnknownTarget { from: String, to: String },
}

/// Immutable, validated stage graph
#[derive(Clone)]
pub struct OrchestrationGraph {
    entry: &'static str,
    nodes: HashMap<&'static str, GraphNode>,
}

impl OrchestrationGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::default()
    }

    pub fn entry(&self) -> &'static str {
        self.entry
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// (node, edge) rows, sorted by node name
    pub fn table(&self) -> Vec<(&'static str, Edge)> {
        let mut rows: Vec<_> = self.nodes.iter().map(|(k, n)| (*k, n.edge)).collect();
        rows.sort_by_key(|(k, _)| *k);
        rows
    }
}

impl fmt::Debug for OrchestrationGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationGraph")
            .field("entry", &self.entry)
            .field("nodes", &self.table())
            .finish()
    }
}

/// Builder for [`OrchestrationGraph`]
#[derive(Default)]
pub struct GraphBuilder {
    entry: Option<&'static str>,
    nodes: Vec<GraphNode>,
}

impl GraphBuilder {
    /// Set the entry node
    pub fn entry(mut self, name: &'static str) -> Self {
        self.entry = Some(name);
        self
    }

    /// Register a stage under its own name with an outgoing edge
    pub fn node(mut self, stage: Arc<dyn Stage>, edge: Edge) -> Self {
        self.nodes.push(GraphNode { stage, edge });
        self
    }

    pub fn build(self) -> Result<OrchestrationGraph, GraphError> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;

        let mut nodes = HashMap::new();
        for node in self.nodes {
            let name = node.stage.name();
            if nodes.insert(name, node).is_some() {
                return Err(GraphError::DuplicateNode(name.to_string()));
            }
        }

        if !nodes.contains_key(entry) {
            return Err(GraphError::UnknownEntry(entry.to_string()));
        }
        for (from, node) in &nodes {
            if let Some(to) = node.edge.targets().into_iter().find(|t| !nodes.contains_key(t)) {
                return Err(GraphError::UnknownTarget {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
        }

        Ok(OrchestrationGraph { entry, nodes })
    }
}

/// The six workers of the standard analysis pipeline
pub struct PipelineStages {
    pub planner: Arc<dyn Stage>,
    pub researcher: Arc<dyn Stage>,
    pub architect: Arc<dyn Stage>,
    pub visualizer: Arc<dyn Stage>,
    pub critic: Arc<dyn Stage>,
    pub meta_critic: Arc<dyn Stage>,
}

/// Wire the standard pipeline, with the critique gate looping back to research
pub fn standard_pipeline(stages: PipelineStages) -> Result<OrchestrationGraph, GraphError> {
    let PipelineStages {
        planner,
        researcher,
        architect,
        visualizer,
        critic,
        meta_critic,
    } = stages;

    let entry = planner.name();
    let research = researcher.name();
    let architect_name = architect.name();
    let visualize = visualizer.name();
    let critique = critic.name();
    let meta = meta_critic.name();

    OrchestrationGraph::builder()
        .entry(entry)
        .node(planner, Edge::Next(research))
        .node(researcher, Edge::Next(architect_name))
        .node(architect, Edge::Next(visualize))
        .node(visualizer, Edge::Next(critique))
        .node(
            critic,
            Edge::Branch {
                decide: critique_gate,
                retry: research,
                advance: meta,
            },
        )
        .node(meta_critic, Edge::Done)
        .build()
}
