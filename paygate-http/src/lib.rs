#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport and Axum middleware for x402 payments on Solana.
//!
//! Protected routes answer `402 Payment Required` with a USDC payment
//! requirement until the client retries with an `X-Payment` header that a
//! remote facilitator verifies.
//!
//! # Modules
//!
//! - [`constants`] - HTTP header names and the currency label
//! - [`headers`] - Base64 encoding/decoding for x402 HTTP headers
//! - [`error`] - HTTP transport error types
//! - [`server`] - Facilitator client, pricing, payment processing and the Axum layer

pub mod constants;
pub mod error;
pub mod headers;
pub mod server;

pub use error::HttpError;
pub use server::{PaygateConfig, PaygateLayer, PaymentInfo, PaymentProcessor, VerifiedPayment};
