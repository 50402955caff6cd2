//! inferscaled — the InferScale daemon.
//!
//! Single binary that assembles the autoscaling controller:
//! - State store (redb)
//! - Per-model scaling policy provider (TOML file, pull-refreshed)
//! - Push-fed metric source
//! - Allocation engine (evaluation loop)
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! inferscaled run --port 8090 --data-dir /var/lib/inferscale \
//!     --model-config /etc/inferscale/models.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;

use inferscale_config::{ConfigProvider, FileConfigProvider, StaticConfigProvider};

#[derive(Parser)]
#[command(name = "inferscaled", about = "InferScale autoscaling controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller (engine loop + API server in one process).
    Run {
        /// Port to listen on.
        #[arg(long, default_value = "8090")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/inferscale")]
        data_dir: PathBuf,

        /// Evaluation cycle interval in seconds.
        #[arg(long, default_value = "30")]
        cycle_interval: u64,

        /// Per-workload metric fetch timeout in seconds.
        #[arg(long, default_value = "5")]
        fetch_timeout: u64,

        /// Path to the per-model scaling policy TOML file. Without it,
        /// every model gets the default policy (no scale-to-zero).
        #[arg(long)]
        model_config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,inferscaled=debug,inferscale=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            port,
            data_dir,
            cycle_interval,
            fetch_timeout,
            model_config,
        } => run(port, data_dir, cycle_interval, fetch_timeout, model_config).await,
    }
}

async fn run(
    port: u16,
    data_dir: PathBuf,
    cycle_interval: u64,
    fetch_timeout: u64,
    model_config: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("InferScale controller starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("inferscale.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // State store.
    let store = inferscale_state::StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    // Per-model scaling policy.
    let config: Arc<dyn ConfigProvider> = match &model_config {
        Some(path) => {
            info!(path = ?path, "scaling policy file configured");
            Arc::new(FileConfigProvider::new(path))
        }
        None => {
            info!("no scaling policy file; scale-to-zero disabled for all models");
            Arc::new(StaticConfigProvider::default())
        }
    };

    // Metric source (fed by counter pushes over the API).
    let source = Arc::new(inferscale_metrics::PushMetricSource::new());

    // Allocation engine.
    let engine = inferscale_autoscale::Engine::new(store.clone(), source.clone(), config)
        .with_fetch_timeout(Duration::from_secs(fetch_timeout));
    info!(interval = cycle_interval, "allocation engine initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    // Evaluation loop.
    let engine_loop = engine.clone();
    let engine_handle = tokio::spawn(async move {
        engine_loop
            .run(Duration::from_secs(cycle_interval), shutdown_rx)
            .await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = inferscale_api::build_router(store, source, engine);
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
    let _ = engine_handle.await;

    info!("InferScale controller stopped");
    Ok(())
}
