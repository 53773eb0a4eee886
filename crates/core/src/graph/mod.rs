//! # Graph Module
//!
//! The orchestration engine: graph table, precondition validator, retry
//! policy, and the executor that walks the graph.

pub mod definition;
pub mod events;
pub mod executor;
pub mod retry;
pub mod validator;

pub use definition::{
    standard_pipeline, BranchFn, Edge, GraphBuilder, GraphError, GraphNode, OrchestrationGraph,
    PipelineStages, ARCHITECT, CRITIQUE, META_CRITIQUE, PLAN, RESEARCH, VISUALIZE,
};
pub use events::{RunEvent, RunEventKind};
pub use executor::Executor;
pub use retry::{critique_gate, Decision, RetryPolicy};
pub use validator::{validate, MissingFields};
