//! faultline: a deterministic fault-injection HTTP server.
//!
//! # Architecture Overview
//!
//! ```text
//!                  ┌──────────────────────────────────────────────────────┐
//!                  │                      FAULTLINE                       │
//!                  │                                                      │
//!  Client Request  │  ┌──────────┐   ┌──────────┐   ┌──────────────────┐  │
//!  ────────────────┼─▶│   net    │──▶│   http   │──▶│     behavior     │  │
//!                  │  │ listener │   │  server  │   │    dispatcher    │  │
//!                  │  └──────────┘   └──────────┘   └────────┬─────────┘  │
//!                  │                                         │            │
//!                  │                     ┌───────────────────┼─────────┐  │
//!                  │                     ▼                   ▼         │  │
//!                  │              ┌─────────────┐    ┌─────────────┐   │  │
//!                  │              │   session   │    │   chunked   │   │  │
//!                  │              │   timers    │    │   writer    │   │  │
//!                  │              └─────────────┘    └──────┬──────┘   │  │
//!  Client Response │                                        │          │  │
//!  ◀───────────────┼────────────────────────────────────────┘          │  │
//!                  │                                                   │  │
//!                  │  ┌─────────────────────────────────────────────┐  │  │
//!                  │  │ lifecycle (start/stop) ◀── /stop ───────────┼──┘  │
//!                  │  │ config · observability                      │     │
//!                  │  └─────────────────────────────────────────────┘     │
//!                  └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use faultline::config::{load_config, FaultConfig, LogFormat};
use faultline::lifecycle::{Server, ServerState};
use faultline::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "faultline", version)]
#[command(about = "HTTP server that misbehaves on purpose, one route per fault", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind, overriding the configuration.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, overriding the configuration (0 picks a free port).
    #[arg(short, long, allow_negative_numbers = true)]
    port: Option<i64>,

    /// Log output format, overriding the configuration.
    #[arg(long, value_enum)]
    log_format: Option<CliLogFormat>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(format: CliLogFormat) -> Self {
        match format {
            CliLogFormat::Text => LogFormat::Text,
            CliLogFormat::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FaultConfig::default(),
    };
    if let Some(host) = cli.host {
        config.listener.host = host;
    }
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(format) = cli.log_format {
        config.observability.log_format = format.into();
    }

    logging::init(&config.observability)?;
    tracing::info!("faultline v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        max_connections = config.listener.max_connections,
        big_file_size = config.behaviors.big_file_size,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Server::new(config)?;
    let mut state = server.subscribe();
    let addr = server.start()?.await?;
    tracing::info!(address = %addr, "Ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, shutting down");
            server.stop()?.await?;
        }
        _ = state.wait_for(|s| *s == ServerState::Stopped) => {
            tracing::info!("Stopped over HTTP");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
