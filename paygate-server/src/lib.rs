//! Example x402 paywall server for Solana USDC.
//!
//! Sells access to a couple of JSON endpoints. Prices, recipient, network
//! and facilitator come from a TOML file; see [`config`].
//!
//! # Modules
//!
//! - [`config`] - Server configuration with environment variable expansion
//! - [`error`] - Configuration error types
//! - [`routes`] - Axum router with payment enforcement
//! - [`util`] - Signal handling and settlement drain on shutdown

pub mod config;
pub mod error;
pub mod routes;
pub mod util;

pub use config::ServerConfig;
pub use routes::router;
