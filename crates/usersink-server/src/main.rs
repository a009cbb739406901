//! usersink service binary
//!
//! Runs the buffered user pipeline until interrupted, then flushes what is
//! left.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! usersink --config usersink.yaml
//!
//! # With environment variables only
//! USERSINK_SAVER__CAPACITY=5000 usersink
//! ```

use clap::Parser;
use tokio::signal;
use tracing::{error, info};

use usersink_server::{init_logging, LoggingConfig, Pipeline, ServiceConfig};

/// usersink - buffered user ingestion service
#[derive(Parser, Debug)]
#[command(name = "usersink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config {
        ServiceConfig::load(&config_path)?
    } else {
        ServiceConfig::from_env()?
    };

    init_logging(LoggingConfig::from(&config.logging));

    info!(version = env!("CARGO_PKG_VERSION"), "Starting usersink");

    let pipeline = match config.storage.backend.as_str() {
        "memory" => {
            info!("Using in-memory storage backend");
            Pipeline::in_memory(&config)?
        }
        other => anyhow::bail!("unsupported storage backend: {other}"),
    };

    pipeline.start()?;

    shutdown_signal().await?;

    let outcome = pipeline.shutdown().await;
    if !outcome.is_complete() {
        error!(
            unpersisted = outcome.unpersisted(),
            "shutdown left users unpersisted"
        );
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    Ok(())
}
