use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::info;

mod app;
mod handlers;

/// Reply engine ingest server — the HTTP-facing half of the pipeline.
#[derive(Parser)]
#[command(name = "replies-ingest-server")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file. Falls back to REPLIES_CONFIG, then
    /// ~/.replies-engine/replies.toml.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "replies_ingest_server=info,tower_http=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("REPLIES_CONFIG").ok());
    let config = replies_core::config::ReplyEngineConfig::load(config_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("config load failed ({}), using defaults", e);
            replies_core::config::ReplyEngineConfig::default()
        });

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let sweep_interval = Duration::from_secs(config.batching.batch_window_seconds);

    let state = Arc::new(app::AppState::new(config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(replies_stage::sweeper::run(
        state.stage.clone(),
        state.locks.clone(),
        sweep_interval,
        shutdown_rx,
    ));

    let router = app::build_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("reply engine ingest server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    let _ = shutdown_tx.send(true);
    Ok(())
}
