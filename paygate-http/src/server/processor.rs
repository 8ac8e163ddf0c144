//! The full payment lifecycle of one request.
//!
//! [`PaymentProcessor::process`] prices the resource, reads the client's
//! payment, checks it against the requirement, has the facilitator verify
//! it and arranges settlement. The result is a [`PaymentOutcome`] telling
//! the adapter whether to run the handler or answer with 402, or a
//! [`PaymentError`] carrying the status code to respond with.

use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use paygate::{PaymentPayload, PaymentRequirement, SettlementResponse};

use super::config::{ConfigError, PaygateConfig};
use super::facilitator_client::FacilitatorClientError;
use super::middleware::{MiddlewareError, PaymentInfo, PaymentMiddleware, PricedRequest};
use super::resource::Resource;
use super::settlement::{SettlementJob, SettlementMode, SettlementQueue, SettlementStats};
use crate::constants::X_PAYMENT_HEADER;
use crate::headers::decode_payment_payload;

/// A payment the facilitator accepted, made available to handlers through
/// request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Paying account. Empty if neither the facilitator nor the payload
    /// named one.
    pub payer: String,
    /// Payment details.
    pub info: PaymentInfo,
}

/// What to do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The resource is free. Run the handler.
    Free,
    /// No usable payment was presented. Answer 402 with the requirement.
    RequirementNeeded {
        /// Terms the client must satisfy.
        requirement: PaymentRequirement,
        /// Payment details.
        info: PaymentInfo,
    },
    /// The payment was verified. Run the handler.
    Verified {
        /// Paying account.
        payer: String,
        /// Payment details.
        info: PaymentInfo,
        /// Settlement result when settled before the handler.
        settlement: Option<SettlementResponse>,
    },
}

/// A request that cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The resource could not be priced.
    #[error("Payment processing error: {0}")]
    Processing(#[source] MiddlewareError),
    /// The payment's scheme or network does not match the requirement.
    #[error("Invalid payment: scheme {scheme:?} on network {network:?}")]
    InvalidPayment {
        /// Scheme the client used.
        scheme: String,
        /// Network the client used.
        network: String,
    },
    /// The facilitator could not be reached or answered garbage.
    #[error("Payment verification error: {0}")]
    Verification(#[source] FacilitatorClientError),
    /// The facilitator rejected the payment.
    #[error("Payment verification failed: {reason}")]
    VerificationFailed {
        /// Facilitator's reason.
        reason: String,
        /// The requirement the payment failed.
        requirement: Box<PaymentRequirement>,
    },
    /// Inline settlement failed.
    #[error("Settlement failed: {reason}")]
    Settlement {
        /// Transport error or facilitator reason.
        reason: String,
        /// The requirement being settled.
        requirement: Box<PaymentRequirement>,
    },
}

impl PaymentError {
    /// HTTP status to answer with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Processing(_) | Self::Verification(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPayment { .. } => StatusCode::BAD_REQUEST,
            Self::VerificationFailed { .. } | Self::Settlement { .. } => {
                StatusCode::PAYMENT_REQUIRED
            }
        }
    }

    /// Message safe to show the client. Internal details are left out.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Processing(_) => "Payment processing error".to_owned(),
            Self::InvalidPayment { .. } => "Invalid payment".to_owned(),
            Self::Verification(_) => "Payment verification error".to_owned(),
            Self::VerificationFailed { reason, .. } => {
                format!("Payment verification failed: {reason}")
            }
            Self::Settlement { .. } => "Settlement failed".to_owned(),
        }
    }

    /// The requirement the client may retry against, for 402 errors.
    #[must_use]
    pub fn requirement(&self) -> Option<&PaymentRequirement> {
        match self {
            Self::VerificationFailed { requirement, .. } | Self::Settlement { requirement, .. } => {
                Some(&**requirement)
            }
            _ => None,
        }
    }
}

/// Returns `true` if `payload` uses the requirement's scheme and network,
/// compared case-insensitively. This is not verification.
#[must_use]
pub fn basic_payment_check(payload: &PaymentPayload, requirement: &PaymentRequirement) -> bool {
    payload.scheme.eq_ignore_ascii_case(&requirement.scheme)
        && payload.network.eq_ignore_ascii_case(&requirement.network)
}

/// Runs the payment lifecycle for requests.
#[derive(Debug)]
pub struct PaymentProcessor {
    middleware: Arc<PaymentMiddleware>,
    mode: SettlementMode,
    queue: Option<SettlementQueue>,
}

impl PaymentProcessor {
    /// Builds the middleware and, in background mode, starts the settlement
    /// queue. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: PaygateConfig) -> Result<Self, ConfigError> {
        let mode = config.settlement_mode;
        let workers = config.settlement_workers;
        let capacity = config.settlement_queue_capacity;
        let middleware = PaymentMiddleware::new(config)?;
        let queue = match mode {
            SettlementMode::Background => Some(SettlementQueue::start(
                middleware.facilitator().clone(),
                workers,
                capacity,
            )),
            SettlementMode::BeforeExecution => None,
        };
        Ok(Self {
            middleware: Arc::new(middleware),
            mode,
            queue,
        })
    }

    /// The pricing and requirement stage.
    #[must_use]
    pub const fn middleware(&self) -> &Arc<PaymentMiddleware> {
        &self.middleware
    }

    /// Background settlement counters. `None` when settling inline.
    #[must_use]
    pub fn settlement_stats(&self) -> Option<SettlementStats> {
        self.queue.as_ref().map(SettlementQueue::stats)
    }

    /// Stops the cache sweep and waits for queued settlements.
    pub async fn shutdown(&self) {
        self.middleware.shutdown();
        if let Some(queue) = &self.queue {
            queue.shutdown().await;
        }
    }

    /// Processes a request whose `X-Payment` header is in `headers`.
    ///
    /// # Errors
    ///
    /// See [`Self::process`].
    pub async fn process_headers(
        &self,
        resource: &Resource,
        headers: &HeaderMap,
    ) -> Result<PaymentOutcome, PaymentError> {
        let header = headers
            .get(X_PAYMENT_HEADER)
            .and_then(|value| value.to_str().ok());
        self.process(resource, header).await
    }

    /// Processes a request for `resource` carrying the given `X-Payment`
    /// header value.
    ///
    /// A missing or undecodable header is not an error: the client is asked
    /// to pay with [`PaymentOutcome::RequirementNeeded`].
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] if pricing fails, the payment does not match
    /// the requirement, verification fails, or inline settlement fails.
    pub async fn process(
        &self,
        resource: &Resource,
        payment_header: Option<&str>,
    ) -> Result<PaymentOutcome, PaymentError> {
        let priced = match self.middleware.process_request(resource).await {
            Ok(Some(priced)) => priced,
            Ok(None) => return Ok(PaymentOutcome::Free),
            Err(err) => {
                tracing::error!(path = %resource.path, error = %err, "Failed to process payment");
                return Err(PaymentError::Processing(err));
            }
        };
        let PricedRequest { requirement, info } = priced;

        let Some(header) = payment_header.filter(|h| !h.trim().is_empty()) else {
            tracing::debug!(path = %resource.path, "No payment provided");
            return Ok(PaymentOutcome::RequirementNeeded { requirement, info });
        };
        let payload = match decode_payment_payload(header) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::debug!(path = %resource.path, error = %err, "Failed to decode payment");
                return Ok(PaymentOutcome::RequirementNeeded { requirement, info });
            }
        };

        self.verify_and_settle(payload, requirement, info).await
    }

    async fn verify_and_settle(
        &self,
        payload: PaymentPayload,
        requirement: PaymentRequirement,
        info: PaymentInfo,
    ) -> Result<PaymentOutcome, PaymentError> {
        if !basic_payment_check(&payload, &requirement) {
            tracing::error!(
                scheme = %payload.scheme,
                network = %payload.network,
                "Payment does not match requirement"
            );
            return Err(PaymentError::InvalidPayment {
                scheme: payload.scheme,
                network: payload.network,
            });
        }

        let client = self.middleware.facilitator();
        let verified = client.verify(&payload, &requirement).await.map_err(|err| {
            tracing::error!(error = %err, "Failed to verify payment");
            PaymentError::Verification(err)
        })?;
        if !verified.is_valid {
            let reason = verified.invalid_reason.unwrap_or_default();
            tracing::warn!(%reason, "Payment verification failed");
            return Err(PaymentError::VerificationFailed {
                reason,
                requirement: Box::new(requirement),
            });
        }
        tracing::info!(payer = %verified.payer, amount = %info.amount, "Payment verified");

        let settlement = match (&self.queue, self.mode) {
            (Some(queue), SettlementMode::Background) => {
                // A full queue does not fail the request; the payment stays
                // verified but unsettled and is counted as rejected.
                if let Err(err) = queue.submit(SettlementJob {
                    payload,
                    requirement,
                }) {
                    tracing::error!(
                        payer = %verified.payer,
                        amount = %info.amount,
                        error = %err,
                        "Serving verified payment without settlement"
                    );
                }
                None
            }
            _ => Some(self.settle_inline(&payload, requirement).await?),
        };

        Ok(PaymentOutcome::Verified {
            payer: verified.payer,
            info,
            settlement,
        })
    }

    async fn settle_inline(
        &self,
        payload: &PaymentPayload,
        requirement: PaymentRequirement,
    ) -> Result<SettlementResponse, PaymentError> {
        let client = self.middleware.facilitator();
        match client.settle(payload, &requirement).await {
            Ok(settlement) if settlement.success => {
                tracing::info!(transaction = %settlement.transaction, "Payment settled");
                Ok(settlement)
            }
            Ok(settlement) => {
                let reason = settlement.error_reason.unwrap_or_default();
                tracing::error!(
                    network = %requirement.network,
                    transaction = %settlement.transaction,
                    %reason,
                    "Settlement failed"
                );
                Err(PaymentError::Settlement {
                    reason,
                    requirement: Box::new(requirement),
                })
            }
            Err(err) => {
                tracing::error!(network = %requirement.network, error = %err, "Failed to settle payment");
                Err(PaymentError::Settlement {
                    reason: err.to_string(),
                    requirement: Box::new(requirement),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::encode_payment_payload;
    use crate::server::pricing::PathBased;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const FEE_PAYER: &str = "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4";

    async fn facilitator() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kinds": [
                {"x402Version": 1, "scheme": "exact", "network": "solana",
                 "extra": {"feePayer": FEE_PAYER}}
            ]})))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer) -> PaygateConfig {
        PaygateConfig::new(RECIPIENT, "solana", server.uri())
            .with_pricing(PathBased::new(Decimal::ZERO).with_price("/paid", Decimal::ONE))
    }

    fn header(scheme: &str, network: &str) -> String {
        encode_payment_payload(&PaymentPayload {
            x402_version: 1,
            scheme: scheme.into(),
            network: network.into(),
            payload: json!({"transaction": "AQID"}),
        })
        .unwrap()
    }

    fn paid() -> Resource {
        Resource::new("GET", "/paid")
    }

    #[tokio::test]
    async fn test_free_resource() {
        let server = facilitator().await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        let outcome = processor
            .process(&Resource::new("GET", "/free"), None)
            .await
            .unwrap();
        assert_eq!(outcome, PaymentOutcome::Free);
    }

    #[tokio::test]
    async fn test_missing_or_garbage_header_needs_payment() {
        let server = facilitator().await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        for header in [None, Some(""), Some("!!not base64!!")] {
            let outcome = processor.process(&paid(), header).await.unwrap();
            assert!(matches!(outcome, PaymentOutcome::RequirementNeeded { .. }));
        }
    }

    #[tokio::test]
    async fn test_mismatched_payment_is_rejected_without_verify() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .expect(0)
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        let err = processor
            .process(&paid(), Some(&header("exact", "solana-devnet")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Invalid payment");
    }

    #[tokio::test]
    async fn test_check_is_case_insensitive() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"isValid": true, "payer": "P"})),
            )
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(
            config(&server).with_settlement_mode(SettlementMode::BeforeExecution),
        )
        .unwrap();
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "transaction": "5sig"})),
            )
            .mount(&server)
            .await;
        let outcome = processor
            .process(&paid(), Some(&header("EXACT", "Solana")))
            .await
            .unwrap();
        match outcome {
            PaymentOutcome::Verified {
                payer, settlement, ..
            } => {
                assert_eq!(payer, "P");
                assert_eq!(settlement.unwrap().transaction, "5sig");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verification_transport_error() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        let err = processor
            .process(&paid(), Some(&header("exact", "solana")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Payment verification error");
        assert!(err.requirement().is_none());
    }

    #[tokio::test]
    async fn test_inline_settlement_failure() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"isValid": true})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"success": false, "errorReason": "blockhash_not_found", "transaction": ""}),
            ))
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(
            config(&server).with_settlement_mode(SettlementMode::BeforeExecution),
        )
        .unwrap();
        assert!(processor.settlement_stats().is_none());
        let err = processor
            .process(&paid(), Some(&header("exact", "solana")))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.public_message(), "Settlement failed");
        assert!(err.requirement().is_some());
    }

    #[tokio::test]
    async fn test_processing_error() {
        let server = MockServer::start().await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        let err = processor.process(&paid(), None).await.unwrap_err();
        assert!(matches!(err, PaymentError::Processing(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Payment processing error");
    }

    #[tokio::test]
    async fn test_saturated_queue_still_serves() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"isValid": true, "payer": "P"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"success": true, "transaction": "5sig"}))
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(
            config(&server)
                .with_settlement_workers(1)
                .with_settlement_queue_capacity(1),
        )
        .unwrap();

        let mut served: u64 = 0;
        for _ in 0..10 {
            let outcome = processor
                .process(&paid(), Some(&header("exact", "solana")))
                .await
                .unwrap();
            assert!(matches!(outcome, PaymentOutcome::Verified { settlement: None, .. }));
            served += 1;
        }
        processor.shutdown().await;

        let stats = processor.settlement_stats().unwrap();
        let settle_calls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/settle")
            .count();
        assert!(stats.rejected > 0);
        assert_eq!(stats.submitted + stats.rejected, served);
        assert_eq!(settle_calls as u64, stats.submitted);
        assert!(served > stats.submitted);
    }

    #[tokio::test]
    async fn test_process_headers_reads_x_payment() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"isValid": false, "invalidReason": "expired"})),
            )
            .mount(&server)
            .await;
        let processor = PaymentProcessor::new(config(&server)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-payment", header("exact", "solana").parse().unwrap());
        let err = processor.process_headers(&paid(), &headers).await.unwrap_err();
        assert_eq!(err.public_message(), "Payment verification failed: expired");
    }
}
