//! Consent Gate
//!
//! Admission control in front of a consent logging endpoint, built with
//! Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌────────────────────────────────────────────────┐
//!                         │                 CONSENT GATE                   │
//!                         │                                                │
//!     Client Request      │  ┌────────┐   ┌──────────────┐   ┌──────────┐  │
//!     ────────────────────┼─▶│  http  │──▶│   security   │──▶│ consent  │  │
//!                         │  │ server │   │ guard chain  │   │ handler  │  │
//!                         │  └────────┘   └──────┬───────┘   └────┬─────┘  │
//!                         │                      │                │        │
//!     Client Response     │       415/413/429/503│             200/400/401 │
//!     ◀───────────────────┼──────────────────────┴────────────────┘        │
//!                         │                                                │
//!                         │  ┌──────────────────────────────────────────┐  │
//!                         │  │          Cross-Cutting Concerns          │  │
//!                         │  │  config · observability · resilience ·   │  │
//!                         │  │  lifecycle                               │  │
//!                         │  └──────────────────────────────────────────┘  │
//!                         └────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use consent_gate::config::{load_config, validate_config, ConfigError};
use consent_gate::lifecycle::{signals, Shutdown};
use consent_gate::observability::{logging, metrics};
use consent_gate::HttpServer;

#[derive(Parser)]
#[command(name = "consent-gate")]
#[command(about = "Admission control gate for consent event ingestion", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file (must set `[rate_limit] window_secs`)
    #[arg(short, long, env = "CONSENT_GATE_CONFIG")]
    config: PathBuf,

    /// Override the listener bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
        validate_config(&config).map_err(ConfigError::Validation)?;
    }

    logging::init_logging(&config.observability)?;

    tracing::info!(
        path = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        ingest_path = %config.listener.ingest_path,
        capacity = config.rate_limit.capacity,
        window_secs = config.rate_limit.window_secs,
        strategy = ?config.rate_limit.strategy,
        failure_policy = ?config.rate_limit.failure_policy,
        max_body_bytes = config.limits.max_body_bytes,
        "Configuration loaded"
    );

    if cli.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_shutdown().await;
        trigger.trigger();
    });

    HttpServer::new(config).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
