//! # Graph Executor
//!
//! Walks an [`OrchestrationGraph`] from its entry node to a terminal state.
//! Owns the run's [`LabState`] exclusively: stages only see a read-only
//! [`StateView`] and hand back patches.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::definition::{Edge, OrchestrationGraph};
use super::events::{RunEvent, RunEventKind};
use super::retry::{Decision, RetryPolicy};
use super::validator;
use crate::config::{ExhaustionPolicy, RunConfig};
use crate::error::{FailureKind, StageFailure};
use crate::stages::StateView;
use crate::state::{self, LabState, StageRecord};

/// Stand-in deadline when the configured timeout overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Drives a run through the graph
///
/// Each call to [`Executor::run`] owns its own `LabState`, but the
/// cancellation token and run ID set by the builder apply to every call.
/// Build one executor per run when runs need to be cancelled or tagged
/// independently.
pub struct Executor {
    graph: OrchestrationGraph,
    config: RunConfig,
    policy: RetryPolicy,
    event_tx: Option<mpsc::Sender<RunEvent>>,
    cancel: CancellationToken,
    run_id: Option<String>,
}

impl Executor {
    pub fn new(graph: OrchestrationGraph, config: RunConfig) -> Self {
        let policy = RetryPolicy::from(&config);
        Self {
            graph,
            config,
            policy,
            event_tx: None,
            cancel: CancellationToken::new(),
            run_id: None,
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Use an external token to cancel the run between stages
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Tag emitted events and log spans with a run ID
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Run the graph for a fresh query
    pub async fn run(&self, query: &str) -> LabState {
        self.run_from(LabState::new(query)).await
    }

    /// Run the graph from an already seeded state, starting at the entry node
    #[tracing::instrument(
        skip(self, state),
        fields(
            run_id = self.run_id.as_deref().unwrap_or("-"),
            query_preview = %state.query.chars().take(50).collect::<String>()
        )
    )]
    pub async fn run_from(&self, mut state: LabState) -> LabState {
        if state.is_terminal() {
            tracing::warn!(status = ?state.status, "State already terminal, nothing to run");
            return state;
        }

        self.emit(RunEvent::new(RunEventKind::RunStarted)).await;
        let mut current = self.graph.entry();

        loop {
            if self.cancel.is_cancelled() {
                tracing::warn!(next_stage = current, "Run cancelled");
                let record = StageRecord::failed(
                    current,
                    state.iteration_count,
                    0,
                    FailureKind::RunCancelled,
                    "run cancelled before the stage started",
                );
                self.emit(RunEvent::new(RunEventKind::RunCancelled).with_stage(current))
                    .await;
                return state::fail(&state, record);
            }

            let Some(node) = self.graph.node(current) else {
                let failure =
                    StageFailure::execution(current, "node is not registered in the graph");
                return self.abort(&state, &failure, 0).await;
            };
            let stage = node.stage.as_ref();

            // 1. Preconditions
            if let Err(missing) = validator::validate(&state, stage) {
                return self.abort(&state, &missing.into(), 0).await;
            }

            // 2. Invoke under the stage deadline
            tracing::info!(stage = current, iteration = state.iteration_count, "Stage started");
            self.emit(
                RunEvent::new(RunEventKind::StageStarted)
                    .with_stage(current)
                    .with_data(serde_json::json!({ "iteration": state.iteration_count })),
            )
            .await;

            let started = Instant::now();
            let deadline = started
                .checked_add(self.config.per_stage_timeout)
                .unwrap_or_else(|| started + FAR_FUTURE);
            let view = StateView::project(&state, stage.requires());
            let result = match tokio::time::timeout_at(deadline, stage.execute(view, deadline)).await
            {
                Ok(result) => result,
                Err(_) => Err(StageFailure::Timeout {
                    stage: current.to_string(),
                    timeout: self.config.per_stage_timeout,
                }),
            };
            let elapsed = started.elapsed().as_millis() as u64;

            let patch = match result {
                Ok(patch) => patch,
                Err(failure) => return self.abort(&state, &failure, elapsed).await,
            };

            // 3. Apply
            state = match state::apply(&state, current, stage.writes(), patch, elapsed) {
                Ok(next) => next,
                Err(e) => {
                    let failure = StageFailure::invalid_output(current, e);
                    return self.abort(&state, &failure, elapsed).await;
                }
            };
            tracing::info!(stage = current, duration_ms = elapsed, "Stage completed");
            self.emit(
                RunEvent::new(RunEventKind::StageCompleted)
                    .with_stage(current)
                    .with_data(serde_json::json!({ "duration_ms": elapsed })),
            )
            .await;

            // 4. Resolve the next node
            current = match node.edge {
                Edge::Next(next) => next,
                Edge::Done => {
                    tracing::info!(
                        iterations = state.iteration_count,
                        exhausted_retries = state.exhausted_retries,
                        "Run completed"
                    );
                    self.emit(RunEvent::new(RunEventKind::RunCompleted)).await;
                    return state::succeed(&state);
                }
                Edge::Branch {
                    decide,
                    retry,
                    advance,
                } => match decide(&state, &self.policy) {
                    Decision::Retry => {
                        let score = state.critique.as_ref().map(|c| c.score);
                        tracing::warn!(
                            ?score,
                            threshold = self.policy.threshold,
                            iteration = state.iteration_count + 1,
                            "Score below threshold, retrying"
                        );
                        state = state::begin_retry(&state);
                        self.emit(
                            RunEvent::new(RunEventKind::RetryScheduled)
                                .with_stage(current)
                                .with_data(serde_json::json!({
                                    "score": score,
                                    "iteration": state.iteration_count,
                                })),
                        )
                        .await;
                        retry
                    }
                    Decision::Advance { exhausted } => {
                        if exhausted {
                            tracing::warn!(
                                max_retries = self.policy.max_retries,
                                "Retry budget exhausted below threshold"
                            );
                            self.emit(
                                RunEvent::new(RunEventKind::RetryBudgetExhausted)
                                    .with_stage(current),
                            )
                            .await;
                            match self.policy.on_exhausted {
                                ExhaustionPolicy::SoftPass => state.exhausted_retries = true,
                                ExhaustionPolicy::Fail => {
                                    let record = StageRecord::failed(
                                        current,
                                        state.iteration_count,
                                        0,
                                        FailureKind::RetryBudgetExhausted,
                                        format!(
                                            "score stayed below {} after {} retries",
                                            self.policy.threshold, self.policy.max_retries
                                        ),
                                    );
                                    self.emit(
                                        RunEvent::new(RunEventKind::RunFailed).with_stage(current),
                                    )
                                    .await;
                                    return state::fail(&state, record);
                                }
                            }
                        }
                        advance
                    }
                },
            };
        }
    }

    /// Record `failure` as the run's single failing entry and close the run
    async fn abort(&self, state: &LabState, failure: &StageFailure, elapsed: u64) -> LabState {
        tracing::error!(
            stage = failure.stage(),
            kind = %failure.kind(),
            error = %failure,
            "Stage failed, aborting run"
        );
        self.emit(
            RunEvent::new(RunEventKind::StageFailed)
                .with_stage(failure.stage())
                .with_data(serde_json::json!({
                    "kind": failure.kind(),
                    "error": failure.to_string(),
                })),
        )
        .await;
        self.emit(RunEvent::new(RunEventKind::RunFailed).with_stage(failure.stage()))
            .await;

        let record = StageRecord::failed(
            failure.stage(),
            state.iteration_count,
            elapsed,
            failure.kind(),
            failure.to_string(),
        );
        state::fail(state, record)
    }

    /// Emit an event
    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event.with_run(self.run_id.as_deref())).await;
        }
    }
}
