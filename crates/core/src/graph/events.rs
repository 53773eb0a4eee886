//! # Run Events
//!
//! Progress events emitted by the executor while a run advances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of run event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    /// Run started
    RunStarted,
    /// Stage invoked
    StageStarted,
    /// Stage patch applied
    StageCompleted,
    /// Stage failed (precondition, execution, timeout, or invalid output)
    StageFailed,
    /// Critique below threshold, looping back
    RetryScheduled,
    /// Critique below threshold but no retries left
    RetryBudgetExhausted,
    /// Run reached its terminal node
    RunCompleted,
    /// Run aborted
    RunFailed,
    /// Run cancelled between stages
    RunCancelled,
}

/// An event in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique event ID
    pub id: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of event
    pub kind: RunEventKind,
    /// Stage the event concerns, if any
    #[serde(default)]
    pub stage: Option<String>,
    /// Run the event belongs to
    #[serde(default)]
    pub run_id: Option<String>,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl RunEvent {
    /// Create a new event
    pub fn new(kind: RunEventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            stage: None,
            run_id: None,
            data: None,
        }
    }

    /// Attach the stage name
    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Some(stage.to_string());
        self
    }

    /// Attach the run ID
    pub fn with_run(mut self, run_id: Option<&str>) -> Self {
        self.run_id = run_id.map(str::to_string);
        self
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}
