//! gopee web proxy
//!
//! # Architecture Overview
//!
//! ```text
//! Browser ──▶ http::server ──▶ proxy::target ──▶ session::store
//!                                                     │
//!                                                     ▼
//!                                              UpstreamClient ──▶ Origin
//!                                                     │
//! Browser ◀── rewrite (html / css) ◀── proxy::respond ◀┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use gopee::config::load_config;
use gopee::http::home::HomePage;
use gopee::lifecycle::signals::wait_for_signal;
use gopee::observability::{logging, metrics};
use gopee::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "gopee")]
#[command(about = "Rewriting web proxy", long_about = None)]
struct Cli {
    /// Optional TOML configuration file. HOST and PORT still override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    logging::init_logging(&config.observability);

    tracing::info!("gopee v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        cookie_name = %config.session.cookie_name,
        max_lifetime_secs = config.session.max_lifetime_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let home = HomePage::load(config.assets.home_template.as_deref())?;

    let listener = TcpListener::bind(config.listener.bind_address()).await?;
    tracing::info!(address = %listener.local_addr()?, "web proxy listening");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let server = HttpServer::new(config, home);
    let server_task = tokio::spawn(server.run(listener, server_shutdown));

    wait_for_signal().await;
    shutdown.trigger();

    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
