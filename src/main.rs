//! relay-proxy
//!
//! Forwards `/proxy/{target}` requests to arbitrary upstream URLs.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ http::proxy ──┬─▶ security::target      (domain)
//!                     (request ID,                   ├─▶ security::allowlist   (403)
//!                      tracing,                      ├─▶ security::rate_limit  (429)
//!                      body limit)                   ├─▶ security::destination (403/502)
//!                                                    └─▶ reqwest ──────────────────────▶ Upstream
//!     Client Response                                                                      │
//!     ◀────────────── http::response ◀─────────────── buffered or streamed ◀───────────────┘
//!                          │
//!                          └─▶ observability::traffic (bytes, requests, rates)
//!
//!     admin (traffic, rate limit, allow-list)   lifecycle (signals, shutdown)
//! ```

use std::path::PathBuf;

use clap::Parser;

use relay_proxy::config::{load_config, ProxyConfig};
use relay_proxy::lifecycle::{startup, Shutdown};
use relay_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "relay-proxy", version, about = "Forwarding HTTP proxy")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_file = ?args.config,
        bind_address = %config.listener.bind_address,
        "relay-proxy starting"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    startup::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
