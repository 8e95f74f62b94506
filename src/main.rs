//! Response-body rewriting gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────────┐
//!                     │                        GATEWAY                           │
//!   Client Request    │  ┌────────┐   ┌─────────┐   ┌──────────────────────────┐ │
//!   ──────────────────┼─▶│  http  │──▶│ routing │──▶│ filter chain (forward)   │ │
//!                     │  │ server │   │  table  │   │ set_path, headers, ...   │ │
//!                     │  └────────┘   └─────────┘   └────────────┬─────────────┘ │
//!                     │                                          ▼               │
//!                     │                              ┌──────────────────────┐    │    Backend
//!                     │                              │ backend (hyper-util) │────┼──▶ Server
//!                     │                              └──────────┬───────────┘    │
//!                     │                                         ▼                │
//!   Client Response   │  ┌────────┐            ┌────────────────────────────┐    │
//!   ◀─────────────────┼──│  http  │◀───────────│ filter chain (return leg)  │    │
//!                     │  │ server │            │ modify_response_body, ...  │    │
//!                     │  └────────┘            └────────────────────────────┘    │
//!                     └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use rewrite_gateway::config::{load_config, GatewayConfig};
use rewrite_gateway::http::HttpServer;
use rewrite_gateway::lifecycle::shutdown_signal;
use rewrite_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "rewrite-gateway")]
#[command(about = "API gateway with response-body rewriting", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; built-in defaults when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if cli.check {
        println!("configuration ok: {} route(s)", config.routes.len());
        return Ok(());
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("rewrite-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        max_in_memory_size = config.codec.max_in_memory_size,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config)?;
    let shutdown = server.shutdown();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
