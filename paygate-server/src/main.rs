//! Example x402 paywall server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p paygate-server --release
//!
//! # Run with custom config path
//! CONFIG=/path/to/config.toml cargo run -p paygate-server
//!
//! # Configure logging level
//! RUST_LOG=paygate_http=debug,info cargo run -p paygate-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` - Override bind address (default: `0.0.0.0`)
//! - `PORT` - Override port (default: `4021`)
//! - `RUST_LOG` - Log level filter (default: `info`)
//!
//! Variables may also be placed in a `.env` file.

use std::net::SocketAddr;
use std::sync::Arc;

use paygate_http::server::PaymentProcessor;
use paygate_server::ServerConfig;
use paygate_server::util::Shutdown;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Server failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load()?;
    let paygate = config.to_paygate_config()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        network = %config.network,
        facilitator = %paygate.facilitator_url,
        routes = config.routes.len(),
        "Loaded configuration"
    );
    if config.routes.is_empty() {
        tracing::warn!("No priced routes configured; every route is free");
    }

    let processor = Arc::new(PaymentProcessor::new(paygate)?);
    let app = paygate_server::router(Arc::clone(&processor));

    let shutdown = Shutdown::install(Arc::clone(&processor))?;
    let token = shutdown.token();

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    shutdown.drain().await;
    tracing::info!("Server shut down gracefully");
    Ok(())
}
