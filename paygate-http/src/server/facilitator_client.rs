//! HTTP client for a remote x402 facilitator.
//!
//! [`FacilitatorClient`] issues the `/supported`, `/verify` and `/settle`
//! calls on behalf of the middleware. Fee-payer lookups go through a
//! [`FeePayerCache`] so `/supported` is not hit on every priced request.
//!
//! ## Error Handling
//!
//! Custom error types capture detailed failure contexts, including
//! - URL construction
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Unexpected HTTP status responses
//!
//! Requests are never retried.

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use paygate::proto::{FacilitatorRequest, SupportedResponse, VerifyResponse};
use paygate::timeouts::Timeouts;
use paygate::{PaymentPayload, PaymentRequirement, SettlementResponse};
use reqwest::Client;
use tracing::instrument;
use url::Url;

use super::cache::FeePayerCache;

/// Errors that can occur while interacting with a remote facilitator.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Unexpected HTTP status code.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The facilitator advertises no fee payer for the network.
    #[error("x402: fee payer not found for network {network:?}")]
    FeePayerNotFound {
        /// Network that was looked up.
        network: String,
    },
}

/// Result of a `POST /verify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Whether the facilitator accepted the payment.
    pub is_valid: bool,
    /// Why the payment was rejected.
    pub invalid_reason: Option<String>,
    /// Paying account. Empty if unknown.
    pub payer: String,
}

impl VerifyOutcome {
    /// Normalizes a raw verify response.
    ///
    /// A valid response without a payer takes it from
    /// `payload.authorization.from`.
    fn from_response(response: VerifyResponse, payload: &PaymentPayload) -> Self {
        let payer = match response.payer.filter(|p| !p.is_empty()) {
            Some(payer) => payer,
            None if response.is_valid => payload.authorization_from(),
            None => String::new(),
        };
        Self {
            is_valid: response.is_valid,
            invalid_reason: response.invalid_reason,
            payer,
        }
    }
}

/// A client for communicating with a remote x402 facilitator.
///
/// Cloning is cheap; clones share the HTTP connection pool and fee-payer cache.
#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    /// Base URL of the facilitator (e.g. `https://facilitator.example/`)
    base_url: Url,
    /// Full URL to `POST /verify` requests
    verify_url: Url,
    /// Full URL to `POST /settle` requests
    settle_url: Url,
    /// Full URL to `GET /supported` requests
    supported_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Optional custom headers sent with each request
    headers: HeaderMap,
    /// Per-operation request timeouts
    timeouts: Timeouts,
    /// Fee payers resolved through `/supported`
    fee_payers: Arc<FeePayerCache>,
}

impl FacilitatorClient {
    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./verify` URL relative to [`FacilitatorClient::base_url`].
    pub const fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    /// Returns the computed `./settle` URL relative to [`FacilitatorClient::base_url`].
    pub const fn settle_url(&self) -> &Url {
        &self.settle_url
    }

    /// Returns the computed `./supported` URL relative to [`FacilitatorClient::base_url`].
    pub const fn supported_url(&self) -> &Url {
        &self.supported_url
    }

    /// Returns any custom headers configured on the client.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeouts.
    pub const fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Returns the fee-payer cache.
    pub const fn fee_payer_cache(&self) -> &Arc<FeePayerCache> {
        &self.fee_payers
    }

    /// Constructs a new [`FacilitatorClient`] from a base URL.
    ///
    /// This sets up `./verify`, `./settle`, and `./supported` endpoint URLs relative to the base.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if URL construction fails.
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        let verify_url = join("./verify", "Failed to construct ./verify URL")?;
        let settle_url = join("./settle", "Failed to construct ./settle URL")?;
        let supported_url = join("./supported", "Failed to construct ./supported URL")?;
        Ok(Self {
            client: Client::new(),
            base_url,
            verify_url,
            settle_url,
            supported_url,
            headers: HeaderMap::new(),
            timeouts: Timeouts::default(),
            fee_payers: Arc::new(FeePayerCache::default()),
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-operation timeouts.
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Uses `cache` for fee-payer lookups.
    #[must_use]
    pub fn with_fee_payer_cache(mut self, cache: Arc<FeePayerCache>) -> Self {
        self.fee_payers = cache;
        self
    }

    /// Resolves the facilitator's fee payer for `network`.
    ///
    /// The cache is consulted first. On a miss `GET /supported` is called
    /// and the first kind whose network matches decides the answer; a found
    /// fee payer is cached.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError::FeePayerNotFound`] if no fee payer is
    /// advertised for `network`, or a transport error from `/supported`.
    pub async fn fee_payer(&self, network: &str) -> Result<String, FacilitatorClientError> {
        if let Some(fee_payer) = self.fee_payers.get(network).await {
            return Ok(fee_payer);
        }
        tracing::debug!(network, "Fee payer cache miss");

        let supported = self.supported().await?;
        let fee_payer = supported
            .fee_payer_for(network)
            .map(str::to_owned)
            .ok_or_else(|| FacilitatorClientError::FeePayerNotFound {
                network: network.to_owned(),
            })?;
        self.fee_payers.set(network, fee_payer.clone()).await;
        Ok(fee_payer)
    }

    /// Sends a `GET /supported` request to the facilitator. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    #[instrument(name = "paygate.facilitator_client.supported", skip_all, err)]
    pub async fn supported(&self) -> Result<SupportedResponse, FacilitatorClientError> {
        self.get_json(&self.supported_url, "GET /supported", self.timeouts.supported)
            .await
    }

    /// Sends a `POST /verify` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    #[instrument(
        name = "paygate.facilitator_client.verify",
        skip_all,
        fields(network = %payload.network, timeout = ?self.timeouts.verify),
        err
    )]
    pub async fn verify(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> Result<VerifyOutcome, FacilitatorClientError> {
        let request = FacilitatorRequest::new(payload, requirement);
        let response: VerifyResponse = self
            .post_json(&self.verify_url, "POST /verify", &request, self.timeouts.verify)
            .await?;
        Ok(VerifyOutcome::from_response(response, payload))
    }

    /// Sends a `POST /settle` request to the facilitator.
    ///
    /// # Errors
    ///
    /// Returns [`FacilitatorClientError`] if the HTTP request fails.
    #[instrument(
        name = "paygate.facilitator_client.settle",
        skip_all,
        fields(network = %payload.network, timeout = ?self.timeouts.settle),
        err
    )]
    pub async fn settle(
        &self,
        payload: &PaymentPayload,
        requirement: &PaymentRequirement,
    ) -> Result<SettlementResponse, FacilitatorClientError> {
        let request = FacilitatorRequest::new(payload, requirement);
        self.post_json(&self.settle_url, "POST /settle", &request, self.timeouts.settle)
            .await
    }

    /// Generic POST helper that handles JSON serialization, error mapping
    /// and timeout application.
    ///
    /// `context` is a human-readable identifier used in error messages (e.g. `"POST /verify"`).
    async fn post_json<T, R>(
        &self,
        url: &Url,
        context: &'static str,
        payload: &T,
        timeout: Duration,
    ) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + Sync + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let req = self.client.post(url.clone()).json(payload);
        self.send(req, context, timeout).await
    }

    /// Generic GET helper, see [`Self::post_json`].
    async fn get_json<R>(
        &self,
        url: &Url,
        context: &'static str,
        timeout: Duration,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        let req = self.client.get(url.clone());
        self.send(req, context, timeout).await
    }

    async fn send<R>(
        &self,
        mut req: reqwest::RequestBuilder,
        context: &'static str,
        timeout: Duration,
    ) -> Result<R, FacilitatorClientError>
    where
        R: serde::de::DeserializeOwned,
    {
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        let http_response = req
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FacilitatorClientError::Http { context, source: e })?;

        if http_response.status() == StatusCode::OK {
            http_response
                .json::<R>()
                .await
                .map_err(|e| FacilitatorClientError::JsonDeserialization { context, source: e })
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| FacilitatorClientError::ResponseBodyRead { context, source: e })?;
            Err(FacilitatorClientError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }
}

/// Converts a string URL into a `FacilitatorClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim().trim_end_matches('/').to_owned();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `FacilitatorClient`.
impl TryFrom<String> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}
