//! rdist command line client
//!
//! # Usage
//!
//! ```bash
//! # Consume resources until Ctrl-C
//! rdist consume
//!
//! # Consume five resources, resting two seconds between requests
//! rdist consume --count 5 --rest 2
//!
//! # Print pushed snapshots from a remote server
//! rdist --host 10.0.0.5 monitor
//! ```

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use rdist_client::{format_report, ClientConfig, ConsumerClient, MonitorClient};

/// rdist client - consume resources or watch server state
#[derive(Parser, Debug)]
#[command(name = "rdist", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Server host
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Server port (default 60118, or $RDIST_PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect as a consumer and print each resource received
    Consume {
        /// Stop after this many resources
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// Seconds to wait between requests
        #[arg(short, long, default_value_t = 0)]
        rest: u64,
    },
    /// Connect as a monitor and print each pushed snapshot
    Monitor {
        /// Stop after this many snapshots
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
}

fn client_config(args: &Args) -> Result<ClientConfig> {
    let mut config = ClientConfig {
        host: args.host.clone(),
        ..Default::default()
    };
    match args.port {
        Some(port) => config.port = port,
        None => {
            if let Ok(port) = env::var("RDIST_PORT") {
                config.port = port.parse().context("RDIST_PORT is not a valid port")?;
            }
        }
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("rdist_client=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = client_config(&args)?;

    let work = async {
        match args.command {
            Command::Consume { count, rest } => consume(&config, count, Duration::from_secs(rest)).await,
            Command::Monitor { count } => monitor(&config, count).await,
        }
    };

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            debug!("Interrupted");
            Ok(())
        }
    }
}

async fn consume(config: &ClientConfig, count: Option<u64>, rest: Duration) -> Result<()> {
    let mut client = ConsumerClient::connect(config)
        .await
        .with_context(|| format!("Is rdistd running on {}?", config.addr()))?;

    let mut received = 0u64;
    while count.map_or(true, |n| received < n) {
        let resource = client.consume().await?;
        received += 1;
        println!("consumed {resource}");

        if !rest.is_zero() {
            sleep(rest).await;
        }
    }
    Ok(())
}

async fn monitor(config: &ClientConfig, count: Option<u64>) -> Result<()> {
    let mut client = MonitorClient::connect(config)
        .await
        .with_context(|| format!("Is rdistd running on {}?", config.addr()))?;

    let mut received = 0u64;
    while count.map_or(true, |n| received < n) {
        let document = client.report().await?;
        received += 1;
        println!("{}", format_report(&document.report));
    }
    Ok(())
}
