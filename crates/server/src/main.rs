mod api;
mod metrics;
mod rate_limit;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use arcsys_core::graph::RunEvent;
use arcsys_core::stages::default_graph;
use arcsys_core::{AnalysisReport, Executor, LabConfig, OrchestrationGraph};

use metrics::Metrics;
use rate_limit::RateLimiter;

/// Application state
struct AppState {
    config: LabConfig,
    graph: OrchestrationGraph,
    /// Events from every run, fanned out to SSE subscribers
    event_tx: broadcast::Sender<RunEvent>,
    limiter: RateLimiter,
    metrics: Metrics,
}

impl AppState {
    fn new(config: LabConfig, limiter: RateLimiter) -> anyhow::Result<Self> {
        let graph = default_graph(&config).context("failed to build the stage graph")?;
        let metrics = Metrics::new().context("failed to register metrics")?;
        let (event_tx, _) = broadcast::channel::<RunEvent>(100);
        Ok(Self {
            config,
            graph,
            event_tx,
            limiter,
            metrics,
        })
    }
}

type SharedState = Arc<AppState>;

#[derive(Parser, Clone)]
#[command(author, version, about = "ArcSys - multi-stage system design lab")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Analyze one query and print the report (no server)
    Run {
        /// The system design question
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },
}

fn init_tracing() {
    let fallback = std::env::var("ARCSYS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn run_server(config: LabConfig, port: u16) -> anyhow::Result<()> {
    let state = AppState::new(config, RateLimiter::from_env())?;
    let app = api::app(Arc::new(state));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("ArcSys server running at http://{}", addr);
    tracing::info!("API v1 routes: /analyze, /health, /config, /events, /metrics, /openapi.json");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn run_once(config: LabConfig, words: Vec<String>) -> anyhow::Result<()> {
    let query = validation::validate_query(&words.join(" "))?;
    let graph = default_graph(&config).context("failed to build the stage graph")?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling after the current stage");
            on_ctrl_c.cancel();
        }
    });

    let state = Executor::new(graph, config.run)
        .with_cancellation(cancel)
        .run(&query)
        .await;
    let report = AnalysisReport::from_state(&state);

    if let Some(failure) = &report.failure {
        if !report.final_markdown.is_empty() {
            println!("{}", report.final_markdown);
        }
        anyhow::bail!(
            "analysis failed at `{}` ({}): {}",
            failure.stage,
            failure.kind,
            failure.message
        );
    }

    println!("{}", report.final_markdown);
    println!();
    println!(
        "Critic score: {}",
        report
            .critic_score
            .map(|s| format!("{:.1}/10", s))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!(
        "Bias score:   {}",
        report
            .bias_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("Iterations:   {}", report.iteration_count);
    if report.exhausted_retries {
        println!("Retries exhausted below the quality threshold");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = LabConfig::from_env()?;
    let args = Args::parse();

    match args.command {
        Some(CliCommand::Run { query }) => run_once(config, query).await,
        Some(CliCommand::Serve { port }) => run_server(config, port).await,
        None => run_server(config, 8080).await,
    }
}
