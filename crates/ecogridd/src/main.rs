//! ecogridd — the EcoGrid daemon.
//!
//! Single binary that assembles all EcoGrid subsystems:
//! - Metric store + intake worker + eviction loop
//! - Scoring engine
//! - Energy-aware autoscaler
//! - Migration planner
//! - Eco-tag classifier
//! - Power forecaster
//! - REST API
//!
//! # Usage
//!
//! ```text
//! ecogridd standalone --port 8090 --config /etc/ecogrid/config.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use ecogrid_api::ApiState;
use ecogrid_autoscale::Autoscaler;
use ecogrid_cloud::{CloudProvider, StaticProvider};
use ecogrid_forecast::Predictor;
use ecogrid_planner::Planner;
use ecogrid_score::Analyzer;
use ecogrid_store::MetricStore;
use ecogrid_tags::TagManager;

use config::EcoGridConfig;

#[derive(Parser)]
#[command(name = "ecogridd", about = "EcoGrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in standalone mode (single-node, all subsystems in one process).
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8090")]
        port: u16,

        /// Path to a TOML config file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ecogridd=debug,ecogrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone { port, config } => {
            let config = match config {
                Some(path) => EcoGridConfig::from_file(&path)?,
                None => EcoGridConfig::default(),
            };
            run_standalone(port, config).await
        }
    }
}

async fn run_standalone(port: u16, config: EcoGridConfig) -> anyhow::Result<()> {
    info!("EcoGrid daemon starting in standalone mode");

    // ── Initialize subsystems ──────────────────────────────────

    // Metric store and its intake worker.
    let (store, worker) = MetricStore::new(config.store);
    info!("metric store initialized");

    // Scoring engine.
    let analyzer = Analyzer::new(config.analyzer);
    info!("scoring engine initialized");

    // Fleet provider. Standalone mode runs against the in-process
    // provider; servers and containers are registered via its handle.
    let provider: Arc<dyn CloudProvider> = Arc::new(StaticProvider::new());
    info!("fleet provider initialized");

    // Autoscaler.
    let mut autoscaler = Autoscaler::new(
        config.autoscaler,
        store.clone(),
        analyzer.clone(),
        provider.clone(),
    );
    info!("autoscaler initialized");

    // Migration planner.
    let planner = Arc::new(Planner::new(
        config.planner,
        store.clone(),
        analyzer.clone(),
        provider.clone(),
    ));
    info!("migration planner initialized");

    // Eco-tag classifier.
    let tags = Arc::new(TagManager::new(
        config.tags,
        store.clone(),
        analyzer.clone(),
        provider.clone(),
    ));
    info!("eco-tag classifier initialized");

    // Power forecaster.
    let forecaster = Arc::new(Predictor::new(config.forecast, store.clone()));
    info!("forecaster initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));

    let eviction_store = store.clone();
    let eviction_shutdown = shutdown_rx.clone();
    let eviction_handle = tokio::spawn(async move {
        eviction_store.run_eviction(eviction_shutdown).await;
    });

    let autoscale_shutdown = shutdown_rx.clone();
    let autoscale_handle = tokio::spawn(async move {
        autoscaler.run(autoscale_shutdown).await;
    });

    let planner_loop = planner.clone();
    let planner_shutdown = shutdown_rx.clone();
    let planner_handle = tokio::spawn(async move {
        planner_loop.run(planner_shutdown).await;
    });

    let tags_loop = tags.clone();
    let tags_shutdown = shutdown_rx.clone();
    let tags_handle = tokio::spawn(async move {
        tags_loop.run(tags_shutdown).await;
    });

    let forecast_loop = forecaster.clone();
    let forecast_handle = tokio::spawn(async move {
        forecast_loop.run(shutdown_rx).await;
    });

    // ── Start API server ───────────────────────────────────────

    if config.api.api_key.is_some() {
        info!("API key authentication enabled");
    }
    let router = ecogrid_api::build_router(ApiState {
        store,
        analyzer,
        planner,
        tags,
        forecaster,
        api_key: config.api.api_key,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = worker_handle.await;
    let _ = eviction_handle.await;
    let _ = autoscale_handle.await;
    let _ = planner_handle.await;
    let _ = tags_handle.await;
    let _ = forecast_handle.await;

    info!("EcoGrid daemon stopped");
    Ok(())
}
