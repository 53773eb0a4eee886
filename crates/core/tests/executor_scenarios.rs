mod common;

use std::sync::Arc;
use std::time::Duration;

use arcsys_core::config::{ExhaustionPolicy, RunConfig};
use arcsys_core::error::{FailureKind, StageFailure};
use arcsys_core::graph::{Executor, RunEventKind, ARCHITECT, CRITIQUE, PLAN, RESEARCH};
use arcsys_core::report::AnalysisReport;
use arcsys_core::state::{Critique, Field, LabState, RunStatus, StageOutcome, StatePatch};
use common::{requirements, Lab, Scripted};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "Design a URL shortener for 10M daily users";

fn run_config(max_retries: u32) -> RunConfig {
    RunConfig {
        critic_threshold: 7.0,
        max_retries,
        ..Default::default()
    }
}

fn failure_kind(state: &LabState) -> Option<FailureKind> {
    match &state.history.last()?.outcome {
        StageOutcome::Failed { kind, .. } => Some(*kind),
        StageOutcome::Succeeded => None,
    }
}

/// Invariants every terminal state must hold
fn assert_terminal_invariants(state: &LabState, config: &RunConfig) {
    assert!(state.iteration_count <= config.max_retries);
    match state.status {
        RunStatus::Succeeded => {
            assert!(state.critique.is_some());
            assert!(state.bias_report.is_some());
            assert!(state.history.iter().all(|r| !r.is_failure()));
        }
        RunStatus::Failed => {
            let failures = state.history.iter().filter(|r| r.is_failure()).count();
            assert_eq!(failures, 1);
            assert!(state.history.last().unwrap().is_failure());
        }
        RunStatus::Running => panic!("run returned a non-terminal state"),
    }
}

#[tokio::test]
async fn test_retry_until_threshold_reached() {
    let lab = Lab::with_scores(vec![5.0, 6.5, 7.2]);
    let config = run_config(3);
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.iteration_count, 2);
    assert!(!state.exhausted_retries);
    assert_eq!(state.critique.as_ref().unwrap().score, 7.2);

    assert_eq!(lab.planner.calls(), 1);
    assert_eq!(lab.researcher.calls(), 3);
    assert_eq!(lab.critic.calls(), 3);
    assert_eq!(lab.meta_critic.calls(), 1);

    // plan + 3 x (research, architect, visualize, critique) + meta_critique
    assert_eq!(state.history.len(), 14);
    let critique_iterations: Vec<u32> = state
        .history
        .iter()
        .filter(|r| r.stage == CRITIQUE)
        .map(|r| r.iteration)
        .collect();
    assert_eq!(critique_iterations, vec![0, 1, 2]);
    assert_eq!(
        state.research.as_ref().unwrap().summary,
        "Key-value store, pass 2"
    );
}

#[tokio::test]
async fn test_exhausted_budget_soft_passes() {
    let lab = Lab::with_scores(vec![3.0, 3.0, 3.0, 3.0]);
    let config = run_config(3);
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.iteration_count, 3);
    assert!(state.exhausted_retries);
    assert_eq!(lab.critic.calls(), 4);

    let report = AnalysisReport::from_state(&state);
    assert_eq!(report.critic_score, Some(3.0));
    assert!(report.exhausted_retries);
    assert!(report.final_markdown.contains("Best effort"));
}

#[tokio::test]
async fn test_exhausted_budget_fails_under_fail_policy() {
    let lab = Lab::with_scores(vec![3.0]);
    let config = RunConfig {
        on_exhausted: ExhaustionPolicy::Fail,
        ..run_config(1)
    };
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(failure_kind(&state), Some(FailureKind::RetryBudgetExhausted));
    assert_eq!(state.history.last().unwrap().stage, CRITIQUE);
    assert!(state.bias_report.is_none());
    assert_eq!(lab.meta_critic.calls(), 0);
}

#[tokio::test]
async fn test_zero_budget_never_retries() {
    let lab = Lab::with_scores(vec![1.0]);
    let config = run_config(0);
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(state.iteration_count, 0);
    assert!(state.exhausted_retries);
    assert_eq!(lab.researcher.calls(), 1);
}

#[tokio::test]
async fn test_missing_requirements_aborts_before_research() {
    let mut lab = Lab::with_scores(vec![9.0]);
    lab.planner = Arc::new(Scripted::new(
        PLAN,
        &[Field::Query],
        &[],
        Box::new(|_, _| Ok(StatePatch::new())),
    ));
    let config = run_config(3);
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(failure_kind(&state), Some(FailureKind::MissingDependency));

    let failure = state.failure().unwrap();
    assert_eq!(failure.stage, RESEARCH);
    match &failure.outcome {
        StageOutcome::Failed { message, .. } => assert!(message.contains("requirements")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(state.research.is_none());
    assert_eq!(lab.researcher.calls(), 0);
}

#[tokio::test]
async fn test_patch_outside_write_set_rejected_before_apply() {
    let mut lab = Lab::with_scores(vec![9.0]);
    lab.planner = Arc::new(Scripted::new(
        PLAN,
        &[Field::Query],
        &[Field::Requirements],
        Box::new(|_, _| {
            Ok(StatePatch::new()
                .with_requirements(requirements())
                .with_critique(Critique {
                    score: 10.0,
                    feedback: "self-approved".to_string(),
                    breakdown: Default::default(),
                }))
        }),
    ));
    let state = Executor::new(lab.graph(), run_config(3)).run(QUERY).await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(failure_kind(&state), Some(FailureKind::StageInvalidOutput));
    assert!(state.requirements.is_none());
    assert!(state.critique.is_none());
    assert_eq!(state.history.len(), 1);
}

#[tokio::test]
async fn test_stage_error_aborts_run() {
    let mut lab = Lab::with_scores(vec![9.0]);
    lab.architect = Arc::new(Scripted::new(
        ARCHITECT,
        &[Field::Requirements, Field::Research],
        &[Field::Architecture],
        Box::new(|_, _| Err(StageFailure::execution(ARCHITECT, "provider unavailable"))),
    ));
    let config = run_config(3);
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(failure_kind(&state), Some(FailureKind::StageExecutionError));
    assert!(state.requirements.is_some());
    assert!(state.research.is_some());
    assert!(state.architecture.is_none());
    assert_eq!(lab.visualizer.calls(), 0);

    let report = AnalysisReport::from_state(&state);
    let failure = report.failure.unwrap();
    assert_eq!(failure.stage, ARCHITECT);
    assert!(failure.message.contains("provider unavailable"));
    assert!(report.final_markdown.contains("# Research Notes"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_stage_times_out() {
    let mut lab = Lab::with_scores(vec![9.0]);
    lab.researcher = Arc::new(common::researcher().with_delay(Duration::from_secs(30)));
    let config = RunConfig {
        per_stage_timeout: Duration::from_secs(5),
        ..run_config(3)
    };
    let state = Executor::new(lab.graph(), config.clone()).run(QUERY).await;

    assert_terminal_invariants(&state, &config);
    assert_eq!(failure_kind(&state), Some(FailureKind::StageTimeout));
    let failure = state.failure().unwrap();
    assert_eq!(failure.stage, RESEARCH);
    assert!((5_000..6_000).contains(&failure.duration_ms));
    assert!(state.research.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_oversized_timeout_still_runs_to_completion() {
    let lab = Lab::with_scores(vec![9.0]);
    let config = RunConfig {
        per_stage_timeout: Duration::from_secs(u64::MAX),
        ..run_config(3)
    };
    let state = Executor::new(lab.graph(), config).run(QUERY).await;

    assert_eq!(state.status, RunStatus::Succeeded);
    assert_eq!(state.history.len(), 6);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let lab = Lab::with_scores(vec![9.0]);
    let token = CancellationToken::new();
    token.cancel();

    let state = Executor::new(lab.graph(), run_config(3))
        .with_cancellation(token)
        .run(QUERY)
        .await;

    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(failure_kind(&state), Some(FailureKind::RunCancelled));
    assert_eq!(state.history.len(), 1);
    assert_eq!(state.history[0].stage, PLAN);
    assert_eq!(lab.planner.calls(), 0);
}

#[tokio::test]
async fn test_cancelled_between_stages() {
    let token = CancellationToken::new();
    let trigger = token.clone();

    let mut lab = Lab::with_scores(vec![9.0]);
    lab.planner = Arc::new(Scripted::new(
        PLAN,
        &[Field::Query],
        &[Field::Requirements],
        Box::new(move |_, _| {
            trigger.cancel();
            Ok(StatePatch::new().with_requirements(requirements()))
        }),
    ));

    let state = Executor::new(lab.graph(), run_config(3))
        .with_cancellation(token)
        .run(QUERY)
        .await;

    assert_eq!(state.status, RunStatus::Failed);
    // the in-flight stage finished and its patch was kept
    assert!(state.requirements.is_some());
    assert_eq!(failure_kind(&state), Some(FailureKind::RunCancelled));
    assert_eq!(state.failure().unwrap().stage, RESEARCH);
    assert_eq!(lab.researcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_same_script_same_terminal_state() {
    let config = run_config(3);

    let first = Executor::new(Lab::with_scores(vec![5.0, 8.0]).graph(), config.clone())
        .run(QUERY)
        .await;
    let second = Executor::new(Lab::with_scores(vec![5.0, 8.0]).graph(), config)
        .run(QUERY)
        .await;

    assert_eq!(first, second);
    assert_eq!(first.iteration_count, 1);
}

#[tokio::test]
async fn test_events_stream_run_progress() {
    let lab = Lab::with_scores(vec![5.0, 6.5, 7.2]);
    let (tx, mut rx) = mpsc::channel(128);

    let state = Executor::new(lab.graph(), run_config(3))
        .with_event_channel(tx)
        .with_run_id("run-1")
        .run(QUERY)
        .await;
    assert_eq!(state.status, RunStatus::Succeeded);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(events.first().unwrap().kind, RunEventKind::RunStarted);
    assert_eq!(events.last().unwrap().kind, RunEventKind::RunCompleted);
    assert!(events.iter().all(|e| e.run_id.as_deref() == Some("run-1")));

    let count = |kind: RunEventKind| events.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(RunEventKind::RetryScheduled), 2);
    assert_eq!(count(RunEventKind::StageStarted), state.history.len());
    assert_eq!(count(RunEventKind::StageCompleted), state.history.len());
    assert_eq!(count(RunEventKind::StageFailed), 0);
}

#[tokio::test]
async fn test_terminal_state_is_not_rerun() {
    let lab = Lab::with_scores(vec![9.0]);
    let executor = Executor::new(lab.graph(), run_config(3));

    let done = executor.run(QUERY).await;
    assert_eq!(done.status, RunStatus::Succeeded);

    let again = executor.run_from(done.clone()).await;
    assert_eq!(again, done);
    assert_eq!(lab.planner.calls(), 1);
}
