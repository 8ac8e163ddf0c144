//! Pricing and requirement construction for a single resource.
//!
//! [`PaymentMiddleware::process_request`] answers one question: does this
//! resource cost money, and if so, what exactly must the client pay? It
//! prices the resource, resolves the facilitator's fee payer and builds the
//! USDC requirement with its metadata. It never looks at a payment.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use paygate::requirement::{RequirementError, UsdcRequirementConfig, build_usdc_requirement};
use paygate::{ChainConfig, Network, PaymentRequirement};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::BoxError;
use super::cache::FeePayerCache;
use super::config::{ConfigError, PaygateConfig};
use super::facilitator_client::{FacilitatorClient, FacilitatorClientError};
use super::pricing::PricingStrategy;
use super::providers::{ResourceProvider, SchemaProvider};
use super::resource::Resource;
use crate::constants::USDC_CURRENCY;

/// Payment details of a priced request, made available to handlers through
/// request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    /// Price in whole USDC.
    pub amount: Decimal,
    /// Always `"USDC"`.
    pub currency: String,
    /// Address receiving the payment.
    pub recipient: String,
    /// Facilitator account paying transaction fees.
    pub fee_payer: String,
}

/// A resource that costs money.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedRequest {
    /// Terms the client must satisfy.
    pub requirement: PaymentRequirement,
    /// Details for downstream handlers.
    pub info: PaymentInfo,
}

/// Failure to price a resource or build its requirement.
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    /// The pricing strategy failed.
    #[error("get price: {0}")]
    Pricing(#[source] BoxError),
    /// The fee payer could not be resolved.
    #[error("{0}")]
    FeePayer(#[source] FacilitatorClientError),
    /// No fee payer is advertised or configured, or the one found is blank.
    #[error("x402: fee payer is required")]
    MissingFeePayer,
    /// The resolved fee payer is not base58.
    #[error("x402: invalid fee payer address")]
    InvalidFeePayer(String),
    /// The requirement could not be built.
    #[error("create payment requirement: {0}")]
    Requirement(#[from] RequirementError),
}

/// Prices resources and builds their payment requirements.
///
/// Owns the fee-payer cache sweep, which stops on [`Self::shutdown`] or
/// when the middleware is dropped.
pub struct PaymentMiddleware {
    config: PaygateConfig,
    pricing: Arc<dyn PricingStrategy>,
    network: Network,
    client: FacilitatorClient,
    sweep: CancellationToken,
}

impl PaymentMiddleware {
    /// Validates `config`, creates the facilitator client and starts the
    /// fee-payer cache sweep at half the cache TTL.
    ///
    /// The sweep needs a tokio runtime. Outside one it is skipped, which is
    /// harmless: expired entries are never returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: PaygateConfig) -> Result<Self, ConfigError> {
        let network = config.validate()?;
        let pricing = config
            .pricing
            .clone()
            .ok_or(ConfigError::MissingPricing)?;

        let cache = Arc::new(FeePayerCache::new(config.cache_ttl));
        let client = FacilitatorClient::try_from(config.facilitator_url.as_str())
            .map_err(ConfigError::InvalidFacilitatorUrl)?
            .with_timeouts(config.timeouts)
            .with_headers(config.facilitator_headers.clone())
            .with_fee_payer_cache(Arc::clone(&cache));

        let sweep = CancellationToken::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            let interval = (config.cache_ttl / 2).max(Duration::from_secs(1));
            drop(cache.spawn_cleanup(interval, sweep.clone()));
        } else {
            tracing::warn!("No tokio runtime, fee payer cache sweep disabled");
        }

        tracing::info!(
            network = %network,
            facilitator = %client.base_url(),
            recipient = %config.recipient,
            "Payment middleware initialized"
        );

        Ok(Self {
            config,
            pricing,
            network,
            client,
            sweep,
        })
    }

    /// The configuration this middleware was built from.
    #[must_use]
    pub const fn config(&self) -> &PaygateConfig {
        &self.config
    }

    /// The resolved network.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// USDC deployment on the configured network.
    #[must_use]
    pub const fn chain(&self) -> &'static ChainConfig {
        self.network.chain()
    }

    /// The facilitator client.
    #[must_use]
    pub const fn facilitator(&self) -> &FacilitatorClient {
        &self.client
    }

    /// Stops the fee-payer cache sweep.
    pub fn shutdown(&self) {
        self.sweep.cancel();
    }

    /// Prices `resource` and builds its payment requirement.
    ///
    /// Returns `Ok(None)` for a free resource (price `<= 0`). Schema and
    /// resource provider failures are logged and do not fail the request.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareError`] if pricing fails, no usable fee payer is
    /// found, or the requirement cannot be built.
    pub async fn process_request(
        &self,
        resource: &Resource,
    ) -> Result<Option<PricedRequest>, MiddlewareError> {
        let price = self
            .pricing
            .price(resource)
            .await
            .map_err(MiddlewareError::Pricing)?;
        if price <= Decimal::ZERO {
            return Ok(None);
        }

        tracing::debug!(
            path = %resource.path,
            method = %resource.method,
            %price,
            "Payment required"
        );

        let fee_payer = self.resolve_fee_payer().await?;

        let mut requirement = build_usdc_requirement(&UsdcRequirementConfig::new(
            self.chain(),
            price.to_string(),
            self.config.recipient.clone(),
        ))?;
        requirement.set_fee_payer(fee_payer.clone());
        self.attach_metadata(&mut requirement, resource).await;

        Ok(Some(PricedRequest {
            requirement,
            info: PaymentInfo {
                amount: price,
                currency: USDC_CURRENCY.to_owned(),
                recipient: self.config.recipient.clone(),
                fee_payer,
            },
        }))
    }

    /// Asks the facilitator first and falls back to the configured fee
    /// payer only when the facilitator advertises none.
    async fn resolve_fee_payer(&self) -> Result<String, MiddlewareError> {
        let fee_payer = match self.client.fee_payer(self.network.as_str()).await {
            Ok(fee_payer) => fee_payer,
            Err(FacilitatorClientError::FeePayerNotFound { .. }) => {
                match self.config.fee_payer.as_deref().filter(|f| !f.trim().is_empty()) {
                    Some(fallback) => {
                        tracing::debug!(network = %self.network, "Using configured fee payer");
                        fallback.to_owned()
                    }
                    None => {
                        tracing::error!(network = %self.network, "Facilitator advertises no fee payer");
                        return Err(MiddlewareError::MissingFeePayer);
                    }
                }
            }
            Err(err) => return Err(MiddlewareError::FeePayer(err)),
        };

        let fee_payer = fee_payer.trim();
        if fee_payer.is_empty() {
            return Err(MiddlewareError::MissingFeePayer);
        }
        if let Err(err) = bs58::decode(fee_payer).into_vec() {
            tracing::error!(fee_payer, error = %err, "Invalid fee payer (not base58)");
            return Err(MiddlewareError::InvalidFeePayer(fee_payer.to_owned()));
        }
        Ok(fee_payer.to_owned())
    }

    async fn attach_metadata(&self, requirement: &mut PaymentRequirement, resource: &Resource) {
        if let Some(provider) = &self.config.resource_provider {
            apply_resource(provider.as_ref(), requirement, resource).await;
        }
        if let Some(provider) = &self.config.schema_provider {
            apply_schema(provider.as_ref(), requirement, resource).await;
        }
    }
}

async fn apply_resource(
    provider: &dyn ResourceProvider,
    requirement: &mut PaymentRequirement,
    resource: &Resource,
) {
    match provider.resource_url(resource).await {
        Ok(url) => requirement.resource = url,
        Err(err) => tracing::warn!(path = %resource.path, error = %err, "Failed to get resource URL"),
    }
    match provider.description(resource).await {
        Ok(description) => requirement.description = description,
        Err(err) => {
            tracing::warn!(path = %resource.path, error = %err, "Failed to get resource description");
        }
    }
}

async fn apply_schema(
    provider: &dyn SchemaProvider,
    requirement: &mut PaymentRequirement,
    resource: &Resource,
) {
    match provider.schema(resource).await {
        Ok(Some(schema)) => requirement.output_schema = Some(schema),
        Ok(None) => {}
        Err(err) => tracing::warn!(path = %resource.path, error = %err, "Failed to get schema"),
    }
}

impl fmt::Debug for PaymentMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentMiddleware")
            .field("config", &self.config)
            .field("network", &self.network)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl Drop for PaymentMiddleware {
    fn drop(&mut self) {
        self.sweep.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::pricing::{Dynamic, Fixed, PathBased};
    use crate::server::providers::{PathResources, ResourceMetadata, StaticSchema};
    use paygate::schema::{EndpointSchema, InputSchema};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const FEE_PAYER: &str = "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4";

    async fn facilitator(kinds: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kinds": kinds})))
            .mount(&server)
            .await;
        server
    }

    fn solana_kind(fee_payer: &str) -> serde_json::Value {
        json!([{"x402Version": 1, "scheme": "exact", "network": "solana",
                "extra": {"feePayer": fee_payer}}])
    }

    fn config(server: &MockServer) -> PaygateConfig {
        PaygateConfig::new(RECIPIENT, "solana", server.uri())
            .with_pricing(PathBased::new(Decimal::ZERO).with_price("/paid", Decimal::new(1, 2)))
    }

    #[tokio::test]
    async fn test_free_resource_skips_facilitator() {
        let server = MockServer::start().await;
        let middleware = PaymentMiddleware::new(config(&server)).unwrap();
        let result = middleware
            .process_request(&Resource::new("GET", "/free"))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_price_is_free() {
        let server = MockServer::start().await;
        let middleware =
            PaymentMiddleware::new(config(&server).with_pricing(Fixed::new(Decimal::NEGATIVE_ONE)))
                .unwrap();
        assert!(middleware.process_request(&Resource::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_priced_resource_builds_requirement() {
        let server = facilitator(solana_kind(&format!("  {FEE_PAYER} "))).await;
        let middleware = PaymentMiddleware::new(config(&server)).unwrap();
        let priced = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(priced.requirement.max_amount_required, "10000");
        assert_eq!(priced.requirement.network, "solana");
        assert_eq!(priced.requirement.pay_to, RECIPIENT);
        assert_eq!(priced.requirement.fee_payer(), Some(FEE_PAYER));
        assert_eq!(priced.info.amount, Decimal::new(1, 2));
        assert_eq!(priced.info.currency, "USDC");
        assert_eq!(priced.info.fee_payer, FEE_PAYER);
    }

    #[tokio::test]
    async fn test_fee_payer_fallback() {
        let server = facilitator(json!([])).await;
        let middleware =
            PaymentMiddleware::new(config(&server).with_fee_payer(FEE_PAYER)).unwrap();
        let priced = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(priced.info.fee_payer, FEE_PAYER);
    }

    #[tokio::test]
    async fn test_unresolvable_fee_payer_fails() {
        let server = facilitator(json!([])).await;
        let middleware = PaymentMiddleware::new(config(&server)).unwrap();
        let err = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap_err();
        assert!(matches!(err, MiddlewareError::MissingFeePayer));
        assert_eq!(err.to_string(), "x402: fee payer is required");
    }

    #[tokio::test]
    async fn test_facilitator_outage_is_not_missing_fee_payer() {
        let server = MockServer::start().await;
        let middleware =
            PaymentMiddleware::new(config(&server).with_fee_payer(FEE_PAYER)).unwrap();
        let err = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MiddlewareError::FeePayer(FacilitatorClientError::HttpStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_fee_payer_fails() {
        let server = facilitator(solana_kind("not-base58-0OIl")).await;
        let middleware = PaymentMiddleware::new(config(&server)).unwrap();
        let err = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap_err();
        assert!(matches!(err, MiddlewareError::InvalidFeePayer(_)));
        assert_eq!(err.to_string(), "x402: invalid fee payer address");
    }

    #[tokio::test]
    async fn test_pricing_error_propagates() {
        let server = MockServer::start().await;
        let pricing =
            Dynamic::from_fn(|_: &Resource| async { Err::<Decimal, BoxError>("boom".into()) });
        let middleware = PaymentMiddleware::new(config(&server).with_pricing(pricing)).unwrap();
        let err = middleware
            .process_request(&Resource::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MiddlewareError::Pricing(_)));
    }

    #[tokio::test]
    async fn test_metadata_providers() {
        let server = facilitator(solana_kind(FEE_PAYER)).await;
        let schema = EndpointSchema::new().with_input(InputSchema::http("GET"));
        let middleware = PaymentMiddleware::new(
            config(&server)
                .with_schema_provider(StaticSchema::new(schema.clone()))
                .with_resource_provider(
                    PathResources::new("https://api.example.com").with_resource(
                        "/paid",
                        ResourceMetadata::new("", "Paid data"),
                    ),
                ),
        )
        .unwrap();
        let priced = middleware
            .process_request(&Resource::new("GET", "/paid"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(priced.requirement.resource, "https://api.example.com/paid");
        assert_eq!(priced.requirement.description, "Paid data");
        assert_eq!(priced.requirement.output_schema, Some(schema));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let err = PaymentMiddleware::new(PaygateConfig::new(RECIPIENT, "base", "http://f"))
            .unwrap_err();
        assert_eq!(err.to_string(), "x402: pricing strategy is required");
    }
}
