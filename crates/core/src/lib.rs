//! # ArcSys Core
//!
//! The engine of the ArcSys system design lab: turns a free-text design
//! request into requirements, research notes, an architecture, diagrams and
//! a scored review by walking a fixed graph of LLM-backed stages.
//!
//! ## Architecture
//!
//! - `state/` - The shared run document (`LabState`) and the patch primitive
//! - `stages/` - Stage contract plus the six LLM workers
//! - `graph/` - Graph table, validator, retry policy and executor
//! - `report` - Reduction of a terminal state to an `AnalysisReport`
//! - `config` / `models` - Run parameters and per-stage model selection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arcsys_core::{config::LabConfig, graph::Executor, report::AnalysisReport, stages};
//!
//! let config = LabConfig::from_env()?;
//! let executor = Executor::new(stages::default_graph(&config)?, config.run.clone());
//! let state = executor.run("Design a URL shortener for 10M daily users").await;
//! let report = AnalysisReport::from_state(&state);
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod models;
pub mod report;
pub mod stages;
pub mod state;

pub use config::{ExhaustionPolicy, LabConfig, RunConfig};
pub use error::{FailureKind, StageFailure};
pub use graph::{Executor, OrchestrationGraph};
pub use report::AnalysisReport;
pub use state::LabState;
