//! # Analyze API
//!
//! Runs one query through the stage graph and answers with the report.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

use arcsys_core::graph::RunEvent;
use arcsys_core::{AnalysisReport, Executor, FailureKind};

use crate::metrics;
use crate::validation::validate_query;
use crate::SharedState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnalyzeRequest {
    /// System design question, 10 to 5000 characters
    pub query: String,
}

/// Report of a completed run plus server-side timing
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    /// Wall time spent serving the request
    pub processing_time_ms: u64,
}

/// Error payload shared by every non-200 answer of `/analyze`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub error_code: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, request_id: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                error_code: code.to_string(),
                request_id: request_id.to_string(),
                stage: None,
                kind: None,
            },
        }
    }

    fn from_report(report: &AnalysisReport, request_id: &str) -> Self {
        match &report.failure {
            Some(failure) => Self {
                status: failure_status(failure.kind),
                body: ErrorBody {
                    error: failure.message.clone(),
                    error_code: failure.kind.as_str().to_string(),
                    request_id: request_id.to_string(),
                    stage: Some(failure.stage.clone()),
                    kind: Some(failure.kind.as_str().to_string()),
                },
            },
            None => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                request_id,
                "run failed without a failure record",
            ),
        }
    }
}

impl ApiError {
    /// Metrics label, the lowercased error code
    fn outcome(&self) -> String {
        self.body.error_code.to_ascii_lowercase()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::StageTimeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::StageExecutionError
        | FailureKind::StageInvalidOutput
        | FailureKind::MissingDependency => StatusCode::BAD_GATEWAY,
        FailureKind::RetryBudgetExhausted | FailureKind::RunCancelled => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Analyze a system design query
#[utoipa::path(
    post,
    path = "/api/v1/analyze",
    tag = "analyze",
    request_body = AnalyzeRequest,
    responses(
        (status = 200, description = "Analysis report with final markdown, scores, run history and processing_time_ms"),
        (status = 400, description = "Query failed validation", body = ErrorBody),
        (status = 422, description = "Body is not a JSON object with a `query` string", body = ErrorBody),
        (status = 429, description = "Too many requests from this client", body = ErrorBody),
        (status = 502, description = "A stage failed or produced invalid output", body = ErrorBody),
        (status = 504, description = "A stage timed out", body = ErrorBody)
    )
)]
pub async fn analyze(
    State(state): State<SharedState>,
    client: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let started = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();
    let client_key = client
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let result = run_analysis(&state, &client_key, &request_id, payload).await;
    let elapsed = started.elapsed();

    match result {
        Ok(report) => {
            state.metrics.record(metrics::SUCCESS, elapsed);
            Ok(Json(AnalyzeResponse {
                report,
                processing_time_ms: elapsed.as_millis() as u64,
            }))
        }
        Err(err) => {
            state.metrics.record(&err.outcome(), elapsed);
            Err(err)
        }
    }
}

async fn run_analysis(
    state: &SharedState,
    client_key: &str,
    request_id: &str,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<AnalysisReport, ApiError> {
    if !state.limiter.check(client_key) {
        tracing::warn!(client = %client_key, request_id = %request_id, "Rate limit exceeded");
        return Err(ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            request_id,
            format!(
                "rate limit of {} requests per minute exceeded",
                state.limiter.limit()
            ),
        ));
    }

    let Json(req) = payload.map_err(|rejection| {
        ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            request_id,
            rejection.body_text(),
        )
    })?;

    let query = validate_query(&req.query).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            request_id,
            e.to_string(),
        )
    })?;

    tracing::info!(request_id = %request_id, client = %client_key, "Analysis requested");

    let (event_mpsc_tx, mut event_mpsc_rx) = mpsc::channel::<RunEvent>(100);
    let broadcast_tx = state.event_tx.clone();

    // Bridge events to broadcast
    tokio::spawn(async move {
        while let Some(event) = event_mpsc_rx.recv().await {
            let _ = broadcast_tx.send(event);
        }
    });

    // Dropping the handler future (client went away) cancels the run
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let executor = Executor::new(state.graph.clone(), state.config.run.clone())
        .with_event_channel(event_mpsc_tx)
        .with_cancellation(cancel)
        .with_run_id(request_id);

    let run = tokio::spawn(async move { executor.run(&query).await });
    let final_state = run.await.map_err(|e| {
        tracing::error!(request_id = %request_id, "Run task panicked: {}", e);
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            request_id,
            "analysis task failed",
        )
    })?;
    let _ = guard.disarm();

    let report = AnalysisReport::from_state(&final_state);
    if report.is_success() {
        tracing::info!(
            request_id = %request_id,
            score = ?report.critic_score,
            iterations = report.iteration_count,
            "Analysis completed"
        );
        Ok(report)
    } else {
        Err(ApiError::from_report(&report, request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_status_mapping() {
        assert_eq!(
            failure_status(FailureKind::StageTimeout),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            failure_status(FailureKind::StageInvalidOutput),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            failure_status(FailureKind::RunCancelled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_omits_empty_stage() {
        let err = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "req-1", "too short");
        let json = serde_json::to_value(&err.body).unwrap();
        assert_eq!(json["error_code"], "VALIDATION_ERROR");
        assert_eq!(json["request_id"], "req-1");
        assert!(json.get("stage").is_none());
        assert_eq!(err.outcome(), "validation_error");
    }

    #[test]
    fn test_response_flattens_report() {
        let response = AnalyzeResponse {
            report: AnalysisReport::from_state(&arcsys_core::LabState::new("Design a cache")),
            processing_time_ms: 1250,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["processing_time_ms"], 1250);
        assert_eq!(json["iteration_count"], 0);
        assert!(json.get("report").is_none());
    }
}
