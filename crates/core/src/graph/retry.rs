//! # Retry Policy
//!
//! Decides the only branch in the graph: after a critique, loop back to
//! research or advance to the meta-critique.

use serde::{Deserialize, Serialize};

use crate::config::{ExhaustionPolicy, RunConfig};
use crate::state::{Critique, LabState};

/// Outcome of the critique gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// Discard the derived fields and re-enter research
    Retry,
    /// Move on; `exhausted` is set when the score is still below threshold
    /// and only the budget stopped another pass
    Advance { exhausted: bool },
}

/// Threshold and budget for quality-driven retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub threshold: f64,
    pub max_retries: u32,
    pub on_exhausted: ExhaustionPolicy,
}

impl RetryPolicy {
    pub fn new(threshold: f64, max_retries: u32) -> Self {
        Self {
            threshold,
            max_retries,
            on_exhausted: ExhaustionPolicy::SoftPass,
        }
    }

    pub fn with_exhaustion(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// `Retry` iff the score is below threshold and budget remains.
    /// A score equal to the threshold advances.
    pub fn decide(&self, critique: &Critique, iteration_count: u32) -> Decision {
        let below = critique.score < self.threshold;
        if below && iteration_count < self.max_retries {
            Decision::Retry
        } else {
            Decision::Advance { exhausted: below }
        }
    }
}

impl From<&RunConfig> for RetryPolicy {
    fn from(config: &RunConfig) -> Self {
        Self::new(config.critic_threshold, config.max_retries).with_exhaustion(config.on_exhausted)
    }
}

/// Branch function for the critique node of the default graph
pub fn critique_gate(state: &LabState, policy: &RetryPolicy) -> Decision {
    match &state.critique {
        Some(critique) => policy.decide(critique, state.iteration_count),
        // Nothing to judge; the next validator reports the gap.
        None => Decision::Advance { exhausted: false },
    }
}
