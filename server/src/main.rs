use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use server::{AppState, feed, serve};
use shared::config::load_config;
use shared::types::AppConfig;

/// Push server streaming debt updates over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "debtwatch-server", version, about)]
struct Args {
    /// TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `server.port`
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = config.server.addr();
    let ws_path = config.channel.path.clone();
    let state = AppState::new(config);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{} (updates at ws://{}{})", addr, addr, ws_path);

    let feed_task = tokio::spawn(feed::run_feed(state.clone()));

    #[cfg(unix)]
    {
        if let Some(path) = args.config.clone() {
            tokio::spawn(reload_on_sighup(path, state.clone()));
        }
    }

    serve(listener, state.clone(), async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
    })
    .await?;

    feed_task.abort();
    info!("{}", state.metrics.snapshot().await.format());
    Ok(())
}

/// Re-read the config file on SIGHUP. Invalid files are logged and ignored.
/// Only `[feed]` changes take effect; see [`AppState::reload_config`].
#[cfg(unix)]
async fn reload_on_sighup(path: PathBuf, state: AppState) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("SIGHUP reload unavailable: {}", e);
            return;
        }
    };

    while hangups.recv().await.is_some() {
        match load_config(&path) {
            Ok(next) => {
                state.reload_config(next).await;
                info!("Reloaded config from {}", path.display());
            }
            Err(e) => warn!("Ignoring invalid config {}: {}", path.display(), e),
        }
    }
}
