//! Server-side payment enforcement for [x402](https://www.x402.org) on Solana.
//!
//! The pieces stack as follows:
//!
//! - [`PaygateConfig`] describes recipient, network, facilitator and pricing,
//!   and is validated once at construction
//! - [`PaymentMiddleware`] prices a [`Resource`] and builds the USDC payment
//!   requirement, filling in the facilitator's fee payer from a TTL cache
//! - [`PaymentProcessor`] reads the `X-Payment` header, has the facilitator
//!   verify it and arranges settlement
//! - [`PaygateLayer`] adapts the processor to Axum
//!
//! ## Settlement Timing
//!
//! By default verified payments are settled in the background by a bounded
//! [`SettlementQueue`](settlement::SettlementQueue), so the handler runs
//! without waiting on the chain. With
//! [`SettlementMode::BeforeExecution`] the payment is settled before the
//! handler runs and a failed settlement fails the request.
//!
//! ## Pricing
//!
//! See [`pricing`] for fixed, per-path, per-method and callback-driven
//! strategies. A price of zero marks a resource as free.
//!
//! For low-level interaction with the facilitator, see
//! [`FacilitatorClient`].

pub mod cache;
pub mod config;
pub mod facilitator_client;
pub mod layer;
pub mod middleware;
pub mod pricing;
pub mod processor;
pub mod providers;
pub mod resource;
pub mod settlement;

/// Error type returned by user-supplied pricing and schema callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub use cache::FeePayerCache;
pub use config::{ConfigError, PaygateConfig};
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError, VerifyOutcome};
pub use layer::{PaygateLayer, PaygateService};
pub use middleware::{MiddlewareError, PaymentInfo, PaymentMiddleware, PricedRequest};
pub use pricing::PricingStrategy;
pub use processor::{
    PaymentError, PaymentOutcome, PaymentProcessor, VerifiedPayment, basic_payment_check,
};
pub use providers::{ResourceProvider, SchemaProvider};
pub use resource::Resource;
pub use settlement::{SettlementMode, SettlementStats};
