//! # System API
//!
//! Health, effective configuration, request metrics and the live event
//! stream.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use utoipa::ToSchema;

use arcsys_core::config::ExhaustionPolicy;
use arcsys_core::graph::{ARCHITECT, CRITIQUE, META_CRITIQUE, PLAN, RESEARCH, VISUALIZE};

use crate::SharedState;

const HEARTBEAT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Model chosen for one stage after overrides are resolved
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StageModel {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigResponse {
    pub critic_threshold: f64,
    pub max_retries: u32,
    pub per_stage_timeout_secs: u64,
    /// `soft_pass` or `fail`
    pub on_exhausted: String,
    pub rate_limit_per_minute: u32,
    pub stages: BTreeMap<String, StageModel>,
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "system",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Effective run configuration and per-stage model selection
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "system",
    responses(
        (status = 200, description = "Effective configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let run = &state.config.run;
    let stages = [PLAN, RESEARCH, ARCHITECT, VISUALIZE, CRITIQUE, META_CRITIQUE]
        .into_iter()
        .map(|stage| {
            let model = state.config.model_config_for(stage);
            (
                stage.to_string(),
                StageModel {
                    provider: model.provider.display_name().to_string(),
                    model: model.model,
                },
            )
        })
        .collect();

    Json(ConfigResponse {
        critic_threshold: run.critic_threshold,
        max_retries: run.max_retries,
        per_stage_timeout_secs: run.per_stage_timeout.as_secs(),
        on_exhausted: match run.on_exhausted {
            ExhaustionPolicy::SoftPass => "soft_pass",
            ExhaustionPolicy::Fail => "fail",
        }
        .to_string(),
        rate_limit_per_minute: state.limiter.limit(),
        stages,
    })
}

/// Prometheus text exposition of request metrics
#[utoipa::path(
    get,
    path = "/api/v1/metrics",
    tag = "system",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain")
    )
)]
pub async fn metrics(State(state): State<SharedState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// SSE stream of run events from every run, with a heartbeat comment
pub async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match tokio::time::timeout(HEARTBEAT, rx.recv()).await {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().event("run_event").data(json)), rx));
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    tracing::warn!(skipped, "SSE subscriber lagged, events dropped");
                    continue;
                }
                Ok(Err(RecvError::Closed)) => return None,
                Err(_) => return Some((Ok(Event::default().comment("heartbeat")), rx)),
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
