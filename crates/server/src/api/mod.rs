//! HTTP routes, nested under `/api/v1`.

pub mod analyze;
pub mod system;

use axum::{
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;

use crate::SharedState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ArcSys API",
        version = "1.0.0",
        description = "Multi-stage system design analysis"
    ),
    paths(analyze::analyze, system::health, system::get_config, system::metrics),
    components(schemas(
        analyze::AnalyzeRequest,
        analyze::ErrorBody,
        system::HealthResponse,
        system::ConfigResponse,
        system::StageModel
    )),
    tags(
        (name = "analyze", description = "Run the design pipeline"),
        (name = "system", description = "Health and configuration")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    ([(header::CONTENT_TYPE, "application/json")], spec)
}

pub fn routes() -> Router<SharedState> {
    Router::new()
        .route("/analyze", post(analyze::analyze))
        .route("/health", get(system::health))
        .route("/config", get(system::get_config))
        .route("/events", get(system::events))
        .route("/metrics", get(system::metrics))
        .route("/openapi.json", get(serve_openapi))
}

/// Full application router with state attached
pub fn app(state: SharedState) -> Router {
    Router::new().nest("/api/v1", routes()).with_state(state)
}
