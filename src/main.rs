//! camp-gate
//!
//! Front door for the multi-tenant camp platform. Every request is admitted
//! (or rejected) before any site handler runs.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ http server ─▶ admission pipeline ─────────────▶ handler
//!                                   │ tenant   (Host → Tenant, 60s cache)
//!                                   │ ip       (blocklist + allowlist)
//!                                   │ rate     (sensitive paths)
//!                                   │ csrf     (state-changing methods)
//!                                   │ session  (HS256 cookie)
//!                                   │ access   (admin / owner / member)
//!
//!     Cross-cutting: config (+ blocklist hot reload), observability,
//!                    lifecycle (signals, shutdown broadcast)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use camp_gate::config::{default_config, load_config, ConfigWatcher};
use camp_gate::lifecycle::{build_server, signals, Shutdown};
use camp_gate::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "camp-gate", version, about = "Multi-tenant request admission gate")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "CAMP_GATE_CONFIG")]
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
        None => default_config(|key| std::env::var(key).ok())?,
    };

    logging::init_tracing(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "camp-gate starting");

    if cli.check {
        // Building the server resolves the secret and seeds the directory.
        build_server(config)?;
        tracing::info!("Configuration OK");
        return Ok(());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        base_domain = %config.tenancy.base_domain,
        rate_rules = config.rate_limit.rules.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let server = build_server(config)?;

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // Hot reload: only the global blocklist is applied live.
    let (_watcher, config_updates) = match &cli.config {
        Some(path) => {
            let (watcher, rx) = ConfigWatcher::new(path);
            (Some(watcher.run()?), rx)
        }
        None => {
            let (_tx, rx) = mpsc::unbounded_channel();
            (None, rx)
        }
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, config_updates, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
