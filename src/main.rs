//! key-relay
//!
//! Ollama-compatible front end over a pool of upstream API credentials.
//!
//! ```text
//!   caller ──▶ http (ollama dialect) ──▶ dispatch ──▶ load_balancer pool
//!                                           │              │
//!                                           ▼              ▼
//!                                       resilience    per-key buckets,
//!                                       (classify,    penalties, health
//!                                        backoff)
//!                                           │
//!                                           ▼
//!                                   upstream (OpenAI-compatible)
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use key_relay::config::load_config;
use key_relay::lifecycle::{wait_for_signal, Shutdown};
use key_relay::observability::{logging, metrics};
use key_relay::HttpServer;

#[derive(Parser)]
#[command(name = "key-relay")]
#[command(about = "Rate-aware relay across a pool of LLM API keys", long_about = None)]
struct Cli {
    /// Path to a TOML config file; built-in defaults when omitted.
    #[arg(short, long, env = "KEY_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("key-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_url = %config.upstream.base_url,
        credentials = config.upstream.api_keys.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    tokio::spawn(wait_for_signal(shutdown.clone()));

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
