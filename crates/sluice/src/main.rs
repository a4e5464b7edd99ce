//! sluice - event-streaming pipeline daemon
//!
//! # Usage
//!
//! ```bash
//! sluice --config /etc/sluice/config.yaml
//! sluice --config config.yaml --http :9090
//! sluice --config config.yaml --http off --mem-limit-ratio 0.9
//! ```
//!
//! `SIGHUP` restarts the pipelines from the config file in place;
//! `SIGINT`/`SIGTERM` shut down gracefully with a 3 second deadline.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sluice::daemon::{self, DaemonArgs};
use sluice::mem;

/// Event-streaming pipeline daemon
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file name
    #[arg(long)]
    config: PathBuf,

    /// HTTP listen addr e.g. ":9000", "off" to disable
    #[arg(long, default_value = ":9000")]
    http: String,

    /// Derive a soft memory limit from the cgroup limit and this
    /// ratio; 0 disables it
    #[arg(long, default_value_t = 0.0)]
    mem_limit_ratio: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "hi, this is sluice"
    );

    mem::apply_mem_limit_ratio(cli.mem_limit_ratio);

    daemon::run(DaemonArgs {
        config: cli.config,
        http: cli.http,
    })
    .await
}

/// Tracing subscriber with `RUST_LOG` override, `info` by default.
fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
    Ok(())
}
