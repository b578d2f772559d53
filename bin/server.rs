// Vantage Risk - Web Server
// REST API with Axum

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use vantage_risk::api::{router, AppState};
use vantage_risk::logging::init_tracing;
use vantage_risk::scoring::load_or_unavailable;
use vantage_risk::{AuditLedger, ServiceConfig};

#[derive(Parser)]
#[command(name = "vantage-server", version, about = "HTTP surface for lending decisions")]
struct Args {
    /// Config file (defaults to ./vantage.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override server.bind_address
    #[arg(long)]
    bind: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = ServiceConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    // Ledger failures are fatal: no decision may be served without an audit trail
    let db_path = &config.storage.database_path;
    let ledger = AuditLedger::open(db_path)
        .with_context(|| format!("Failed to open ledger at {}", db_path.display()))?;
    tracing::info!(path = %db_path.display(), records = ledger.count()?, "audit ledger opened");

    // Model failures are not: audit reads keep working, scoring returns 503
    let scorer = load_or_unavailable(&config.model.artifact_path);

    tracing::info!(
        benchmark_lambda = config.simulation.risk_aversion,
        "backtest prices risk with a fixed portfolio λ; live decisions use the caller's λ"
    );

    let state = AppState::new(&config, scorer, Arc::new(ledger));
    let app = router(state, &config.server.allowed_origins);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_address))?;

    tracing::info!(address = %config.server.bind_address, "server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
