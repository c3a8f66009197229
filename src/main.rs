//! Resilience admin service.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ loader ──▶ validation ──▶ ResilienceConfig
//!        │                                          │
//!        ▼                                          ▼
//!   ConfigWatcher ── reload ──▶ Services { breakers, errors, retries }
//!                                                   │
//!                                                   ▼
//!                               MonitoringFacade ──▶ admin router (/api/resilience)
//!                                                   │
//!                                   metrics ◀───────┴───────▶ tracing
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use resilience_core::admin;
use resilience_core::config::loader::{load_config, load_from_env};
use resilience_core::config::watcher::ConfigWatcher;
use resilience_core::lifecycle::signals::wait_for_signal;
use resilience_core::lifecycle::{Services, Shutdown};
use resilience_core::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "resilience-core")]
#[command(about = "Resilience admin service", long_about = None)]
struct Args {
    /// Path to a TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilience-core starting");

    if config.observability.metrics_enabled {
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let services = Services::from_config(&config);
    let shutdown = Shutdown::new();

    // Hot reload; the watcher handle must outlive the server.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            services.spawn_reload_loop(updates, &shutdown);
            Some(watcher.run()?)
        }
        None => None,
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            shutdown.trigger();
        });
    }

    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        admin::serve(listener, services.facade(), &shutdown).await?;
    } else {
        tracing::info!("Admin API disabled, waiting for shutdown signal");
        shutdown.signalled().await;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
