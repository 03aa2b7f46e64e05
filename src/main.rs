use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use bucketd::config::Config;
use bucketd::server::Server;

/// StatsD-compatible metrics aggregation daemon.
#[derive(Parser)]
#[command(name = "bucketd", version, about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// UDP listen address (overrides the config file).
    #[arg(long)]
    udp_addr: Option<String>,

    /// TCP listen address (overrides the config file).
    #[arg(long)]
    tcp_addr: Option<String>,

    /// Flush interval in milliseconds (overrides the config file).
    #[arg(long)]
    flush_interval: Option<u64>,

    /// Graphite server address (overrides the config file).
    #[arg(long)]
    graphite_addr: Option<String>,

    /// Log a human-readable dump of every flush.
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Folds the direct flags over the loaded configuration.
    fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(addr) = &self.udp_addr {
            cfg.udp_server_address = addr.clone();
        }
        if let Some(addr) = &self.tcp_addr {
            cfg.tcp_server_address = addr.clone();
        }
        if let Some(interval) = self.flush_interval {
            cfg.flush_interval = interval;
        }
        if let Some(addr) = &self.graphite_addr {
            cfg.graphite_address = addr.clone();
        }
        if self.debug {
            cfg.debug = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    // Load the config file when given, otherwise run on defaults.
    let mut cfg = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    cli.apply_overrides(&mut cfg);
    cfg.validate().context("validating configuration")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        udp = %cfg.udp_server_address,
        "starting bucketd",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    // Start the server.
    let mut server = Server::new(cfg);
    server.start().await?;

    // Wait for a signal, or for the server to trip its own token on a
    // fatal accept failure.
    let cancelled = server.cancel_token();
    tokio::select! {
        _ = shutdown_rx => {}
        _ = cancelled.cancelled() => {}
    }

    server.stop().await;

    tracing::info!("bucketd stopped");

    Ok(())
}
