//! Lima Connect dashboard - Main entry point
//!
//! Runs the live view synchronization engine over the in-process store and
//! serves the office dashboard API and event stream.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lima_common::events::EventBus;
use lima_common::DashboardConfig;
use lima_dashboard::store::{MemoryStore, SeedFile};
use lima_dashboard::{build_router, AppState, EngineSettings, SessionSignal, SubscriptionManager};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lima-dashboard
#[derive(Parser, Debug)]
#[command(name = "lima-dashboard")]
#[command(about = "Live office dashboard for Lima Connect")]
#[command(version)]
struct Args {
    /// Path to config file (overrides LIMA_CONFIG and the default location)
    #[arg(short, long, env = "LIMA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// JSON file with documents and profiles to preload (overrides config)
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Sign in with this session id at startup
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = DashboardConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(seed) = args.seed {
        config.seed_file = Some(seed);
    }

    // Initialize tracing; RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lima_dashboard={0},lima_common={0},tower_http=info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Lima Connect dashboard v{} ({}, {} build, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.seed_file {
        let count = seed_store(&store, path).await?;
        info!("Seeded {} documents from {}", count, path.display());
    }

    let event_bus = EventBus::new(config.event_bus_capacity);
    let engine = Arc::new(SubscriptionManager::new(
        Arc::clone(&store),
        Arc::clone(&store),
        event_bus,
        EngineSettings::from(&config),
    ));

    let initial = match args.session {
        Some(id) => SessionSignal::signed_in(id),
        None => SessionSignal::signed_out(),
    };
    let (session_tx, session_rx) = watch::channel(initial);

    let watcher = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(session_rx).await })
    };

    let state = AppState::new(Arc::clone(&engine), session_tx);
    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {:?}", config.bind_addr))?;
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Event streams never finish on their own
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // The router (and with it the session sender) is gone; the watcher closes
    // the subscription and exits.
    if let Err(e) = watcher.await {
        warn!("Session watcher ended abnormally: {}", e);
    }
    info!("Server shutdown complete");
    Ok(())
}

async fn seed_store(store: &MemoryStore, path: &Path) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
    Ok(store.load_seed(seed).await)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
