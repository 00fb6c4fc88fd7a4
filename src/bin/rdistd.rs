//! rdist server - bounded resource buffer with remote consumers and monitors
//!
//! # Usage
//!
//! ```bash
//! # Defaults: capacity 3, 5 producers, delays 1 1 2 1, quiet
//! rdistd
//!
//! # capacity, producers, consume delay, consumer rest,
//! # produce delay, producer rest, verbose (0/1)
//! rdistd 10 4 1 0 2 1 1
//!
//! # Different port and a config file
//! rdistd --port 7000 --config ./rdistd.toml
//! ```

use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rdistd::{RdistServer, ServerConfig};

/// rdist server - producers fill a bounded buffer, consumers drain it,
/// monitors watch
#[derive(Parser, Debug)]
#[command(name = "rdistd", version, about)]
struct Args {
    /// Buffer capacity
    capacity: Option<usize>,

    /// Number of producers
    producers: Option<usize>,

    /// Seconds a consumer service spends consuming
    consume_delay: Option<u64>,

    /// Seconds a consumer service rests after consuming
    consumer_rest: Option<u64>,

    /// Seconds a producer spends producing
    produce_delay: Option<u64>,

    /// Seconds a producer rests between cycles
    producer_rest: Option<u64>,

    /// Verbose logging (0 or 1)
    #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
    verbose: Option<u8>,

    /// TCP port (default 60118, or $RDIST_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// TOML config file (default: $XDG_CONFIG_HOME/rdist/rdistd.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Layers defaults, the config file, positional arguments and flags.
fn build_config(args: &Args) -> Result<ServerConfig> {
    let mut config = ServerConfig::default();

    match &args.config {
        Some(path) => config
            .merge_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            if let Some(path) = ServerConfig::default_file_path().filter(|p| p.exists()) {
                config
                    .merge_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
            }
        }
    }

    let secs = Duration::from_secs;
    if let Some(capacity) = args.capacity {
        config.buffer_capacity = capacity;
    }
    if let Some(producers) = args.producers {
        config.producer_count = producers;
    }
    if let Some(s) = args.consume_delay {
        config.consume_delay = secs(s);
    }
    if let Some(s) = args.consumer_rest {
        config.consumer_rest = secs(s);
    }
    if let Some(s) = args.produce_delay {
        config.produce_delay = secs(s);
    }
    if let Some(s) = args.producer_rest {
        config.producer_rest = secs(s);
    }
    if let Some(verbose) = args.verbose {
        config.verbose = verbose == 1;
    }

    match args.port {
        Some(port) => config.port = port,
        None => {
            if let Ok(port) = env::var("RDIST_PORT") {
                config.port = port.parse().context("RDIST_PORT is not a valid port")?;
            }
        }
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(&args)?;
    run_server(config)
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    let level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("rdistd={level}").parse()?)
                .add_directive(format!("rdist_core={level}").parse()?)
                .add_directive(format!("rdist_protocol={level}").parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "rdist server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = RdistServer::new(config, cancel_token)?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("rdist server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
