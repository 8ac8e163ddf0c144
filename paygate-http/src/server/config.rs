//! Construction-time configuration of the payment middleware.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use paygate::Network;
use paygate::timeouts::{TimeoutError, Timeouts};

use super::cache::FeePayerCache;
use super::pricing::PricingStrategy;
use super::providers::{ResourceProvider, SchemaProvider};
use super::settlement::SettlementMode;

/// Invalid middleware configuration. Fatal at construction.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No recipient address.
    #[error("x402: recipient address is required")]
    MissingRecipient,
    /// No network.
    #[error("x402: network is required")]
    MissingNetwork,
    /// No facilitator URL.
    #[error("x402: facilitator URL is required")]
    MissingFacilitator,
    /// No pricing strategy.
    #[error("x402: pricing strategy is required")]
    MissingPricing,
    /// The network is not a supported Solana cluster.
    #[error("x402: network not supported: {0:?}")]
    NetworkNotSupported(String),
    /// The facilitator URL does not parse.
    #[error("x402: invalid facilitator URL: {0}")]
    InvalidFacilitatorUrl(#[source] super::FacilitatorClientError),
    /// The static fee payer is not a base58 address.
    #[error("x402: invalid fee payer address")]
    InvalidFeePayer,
    /// The timeouts cannot work.
    #[error("x402: invalid timeouts: {0}")]
    InvalidTimeouts(#[from] TimeoutError),
    /// Zero settlement workers or queue capacity.
    #[error("x402: settlement {0} must be positive")]
    InvalidSettlementPool(&'static str),
}

/// Configuration of [`PaymentMiddleware`](super::PaymentMiddleware).
///
/// Recipient, network, facilitator URL and pricing are required; everything
/// else has a default.
#[derive(Clone)]
pub struct PaygateConfig {
    /// Address receiving payments.
    pub recipient: String,
    /// Network name, e.g. `"solana"` or `"solana-devnet"`.
    pub network: String,
    /// Base URL of the facilitator.
    pub facilitator_url: String,
    /// How resources are priced.
    pub pricing: Option<Arc<dyn PricingStrategy>>,
    /// Fee payer used when the facilitator advertises none.
    pub fee_payer: Option<String>,
    /// Lifetime of cached fee payers.
    pub cache_ttl: Duration,
    /// Supplies `outputSchema` for requirements.
    pub schema_provider: Option<Arc<dyn SchemaProvider>>,
    /// Supplies resource URLs and descriptions for requirements.
    pub resource_provider: Option<Arc<dyn ResourceProvider>>,
    /// Facilitator call timeouts.
    pub timeouts: Timeouts,
    /// Extra headers sent with every facilitator call.
    pub facilitator_headers: HeaderMap,
    /// When settlement happens relative to the handler.
    pub settlement_mode: SettlementMode,
    /// Maximum concurrent background settlements.
    pub settlement_workers: usize,
    /// Maximum queued background settlements.
    pub settlement_queue_capacity: usize,
}

impl PaygateConfig {
    /// Default number of settlement workers.
    pub const DEFAULT_SETTLEMENT_WORKERS: usize = 4;

    /// Default settlement queue capacity.
    pub const DEFAULT_SETTLEMENT_QUEUE_CAPACITY: usize = 256;

    /// Creates a configuration with every optional setting at its default.
    pub fn new(
        recipient: impl Into<String>,
        network: impl Into<String>,
        facilitator_url: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            network: network.into(),
            facilitator_url: facilitator_url.into(),
            ..Self::default()
        }
    }

    /// Sets the pricing strategy.
    #[must_use]
    pub fn with_pricing(mut self, pricing: impl PricingStrategy + 'static) -> Self {
        self.pricing = Some(Arc::new(pricing));
        self
    }

    /// Sets the fallback fee payer.
    #[must_use]
    pub fn with_fee_payer(mut self, fee_payer: impl Into<String>) -> Self {
        self.fee_payer = Some(fee_payer.into());
        self
    }

    /// Sets the fee-payer cache lifetime.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the schema provider.
    #[must_use]
    pub fn with_schema_provider(mut self, provider: impl SchemaProvider + 'static) -> Self {
        self.schema_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the resource provider.
    #[must_use]
    pub fn with_resource_provider(mut self, provider: impl ResourceProvider + 'static) -> Self {
        self.resource_provider = Some(Arc::new(provider));
        self
    }

    /// Sets the facilitator timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Sets headers sent with every facilitator call.
    #[must_use]
    pub fn with_facilitator_headers(mut self, headers: HeaderMap) -> Self {
        self.facilitator_headers = headers;
        self
    }

    /// Sets the settlement mode.
    #[must_use]
    pub const fn with_settlement_mode(mut self, mode: SettlementMode) -> Self {
        self.settlement_mode = mode;
        self
    }

    /// Sets the number of concurrent background settlements.
    #[must_use]
    pub const fn with_settlement_workers(mut self, workers: usize) -> Self {
        self.settlement_workers = workers;
        self
    }

    /// Sets the settlement queue capacity.
    #[must_use]
    pub const fn with_settlement_queue_capacity(mut self, capacity: usize) -> Self {
        self.settlement_queue_capacity = capacity;
        self
    }

    /// Checks the configuration and resolves its network.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, required fields first.
    pub fn validate(&self) -> Result<Network, ConfigError> {
        if self.recipient.trim().is_empty() {
            return Err(ConfigError::MissingRecipient);
        }
        if self.network.trim().is_empty() {
            return Err(ConfigError::MissingNetwork);
        }
        if self.facilitator_url.trim().is_empty() {
            return Err(ConfigError::MissingFacilitator);
        }
        if self.pricing.is_none() {
            return Err(ConfigError::MissingPricing);
        }
        let network: Network = self
            .network
            .parse()
            .map_err(|_| ConfigError::NetworkNotSupported(self.network.clone()))?;
        if let Some(fee_payer) = &self.fee_payer {
            let fee_payer = fee_payer.trim();
            if !fee_payer.is_empty() && bs58::decode(fee_payer).into_vec().is_err() {
                return Err(ConfigError::InvalidFeePayer);
            }
        }
        self.timeouts.validate()?;
        if self.settlement_workers == 0 {
            return Err(ConfigError::InvalidSettlementPool("workers"));
        }
        if self.settlement_queue_capacity == 0 {
            return Err(ConfigError::InvalidSettlementPool("queue capacity"));
        }
        Ok(network)
    }
}

impl Default for PaygateConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            network: String::new(),
            facilitator_url: String::new(),
            pricing: None,
            fee_payer: None,
            cache_ttl: FeePayerCache::DEFAULT_TTL,
            schema_provider: None,
            resource_provider: None,
            timeouts: Timeouts::default(),
            facilitator_headers: HeaderMap::new(),
            settlement_mode: SettlementMode::default(),
            settlement_workers: Self::DEFAULT_SETTLEMENT_WORKERS,
            settlement_queue_capacity: Self::DEFAULT_SETTLEMENT_QUEUE_CAPACITY,
        }
    }
}

impl fmt::Debug for PaygateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaygateConfig")
            .field("recipient", &self.recipient)
            .field("network", &self.network)
            .field("facilitator_url", &self.facilitator_url)
            .field("pricing", &self.pricing.as_ref().map(|_| "<pricing>"))
            .field("fee_payer", &self.fee_payer)
            .field("cache_ttl", &self.cache_ttl)
            .field("schema_provider", &self.schema_provider.is_some())
            .field("resource_provider", &self.resource_provider.is_some())
            .field("timeouts", &self.timeouts)
            .field("settlement_mode", &self.settlement_mode)
            .field("settlement_workers", &self.settlement_workers)
            .field("settlement_queue_capacity", &self.settlement_queue_capacity)
            .finish_non_exhaustive()
    }
}
