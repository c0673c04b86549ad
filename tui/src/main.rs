//! Terminal dashboard for live debt updates.

mod app;
mod format;
#[cfg(test)]
mod test_support;
mod ui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shared::channel::UpdateChannel;
use shared::config::load_config;
use shared::types::AppConfig;

use app::App;

/// Watch debt updates stream in from a debtwatch server.
#[derive(Parser, Debug)]
#[command(name = "debtwatch", version, about)]
struct Args {
    /// TOML config file; only the `[channel]` section is used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Page origin to derive the socket URL from, e.g. https://example.com
    #[arg(short, long)]
    url: Option<String>,

    /// Log file. The terminal belongs to the dashboard, so logs never go to stdout.
    #[arg(long, default_value = "debtwatch.log")]
    log_file: PathBuf,
}

fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(url) = args.url {
        config.channel.page_url = url;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start tokio runtime")?;
    let _guard = runtime.enter();

    let channel = UpdateChannel::connect(&config.channel).context("Invalid channel config")?;
    info!("Dashboard connecting to {}", channel.url());

    let mut app = App::new(channel);
    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal);
    ratatui::restore();

    runtime.block_on(app.into_channel().close());
    info!("Dashboard closed");
    result
}
