//! Axum middleware for enforcing [x402](https://www.x402.org) payments on protected routes.
//!
//! [`PaygateLayer`] runs every request through a [`PaymentProcessor`]:
//!
//! - free resources are passed through untouched
//! - requests without a usable `X-Payment` header get `402 Payment Required`
//!   with the payment requirement in a JSON body
//! - verified requests reach the handler with
//!   [`PaymentInfo`](super::middleware::PaymentInfo) and [`VerifiedPayment`]
//!   in the request extensions
//! - failures are answered with `{"x402Version":1,"error":...}` and the
//!   error's status code
//!
//! When settlement runs before the handler, the settlement result is
//! returned in the `X-Payment-Response` header.
//!
//! ```no_run
//! use axum::{Extension, Router, routing::get};
//! use paygate_http::server::{PaygateConfig, PaygateLayer, PaymentInfo, pricing::Fixed};
//! use rust_decimal::Decimal;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PaygateConfig::new(
//!     "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
//!     "solana-devnet",
//!     "https://facilitator.payai.network",
//! )
//! .with_pricing(Fixed::new(Decimal::new(1, 2)));
//!
//! let app: Router = Router::new()
//!     .route("/weather", get(|Extension(info): Extension<PaymentInfo>| async move {
//!         format!("paid {} {}", info.amount, info.currency)
//!     }))
//!     .layer(PaygateLayer::new(config)?);
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum_core::body::Body;
use axum_core::extract::Request;
use axum_core::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use paygate::proto::{PaymentRequired, X402V1};
use paygate::PaymentRequirement;
use serde::Serialize;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service};

use super::config::{ConfigError, PaygateConfig};
use super::processor::{PaymentError, PaymentOutcome, PaymentProcessor, VerifiedPayment};
use super::resource::Resource;
use crate::constants::{X_PAYMENT, X_PAYMENT_RESPONSE, X_PAYMENT_RESPONSE_HEADER};
use crate::headers::settlement_header_value;

/// Tower layer enforcing x402 payments.
///
/// Cloning is cheap; clones share one [`PaymentProcessor`].
#[derive(Clone, Debug)]
pub struct PaygateLayer {
    processor: Arc<PaymentProcessor>,
}

impl PaygateLayer {
    /// Builds the processor from `config`. Must be called from within a
    /// tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(config: PaygateConfig) -> Result<Self, ConfigError> {
        Ok(Self::from_processor(Arc::new(PaymentProcessor::new(config)?)))
    }

    /// Wraps an existing processor, e.g. one shared with a shutdown hook.
    #[must_use]
    pub const fn from_processor(processor: Arc<PaymentProcessor>) -> Self {
        Self { processor }
    }

    /// The shared processor.
    #[must_use]
    pub const fn processor(&self) -> &Arc<PaymentProcessor> {
        &self.processor
    }
}

impl<S> Layer<S> for PaygateLayer
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = PaygateService;

    fn layer(&self, inner: S) -> Self::Service {
        PaygateService {
            processor: Arc::clone(&self.processor),
            inner: BoxCloneSyncService::new(inner),
        }
    }
}

/// Axum service that enforces x402 payments on incoming requests.
#[derive(Clone)]
#[allow(missing_debug_implementations)] // BoxCloneSyncService does not implement Debug
pub struct PaygateService {
    processor: Arc<PaymentProcessor>,
    /// The inner Axum service being wrapped
    inner: BoxCloneSyncService<Request, Response, Infallible>,
}

impl Service<Request> for PaygateService {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    /// Delegates readiness polling to the wrapped inner service.
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let processor = Arc::clone(&self.processor);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // The body is not Sync, so nothing borrowed from `req` may cross an await.
            let resource = Resource::from_request(&req);
            let payment = req
                .headers()
                .get(X_PAYMENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let outcome = processor.process(&resource, payment.as_deref()).await;
            match outcome {
                Ok(PaymentOutcome::Free) => inner.call(req).await,
                Ok(PaymentOutcome::RequirementNeeded { requirement, .. }) => {
                    Ok(payment_required_response(requirement))
                }
                Ok(PaymentOutcome::Verified {
                    payer,
                    info,
                    settlement,
                }) => {
                    let settlement_header = settlement.as_ref().and_then(|settlement| {
                        settlement_header_value(settlement)
                            .inspect_err(|err| {
                                tracing::error!(error = %err, "Failed to encode settlement header");
                            })
                            .ok()
                    });
                    req.extensions_mut().insert(info.clone());
                    req.extensions_mut().insert(VerifiedPayment { payer, info });

                    let mut response = inner.call(req).await?;
                    if let Some(value) = settlement_header {
                        let headers = response.headers_mut();
                        headers.insert(X_PAYMENT_RESPONSE, value);
                        headers.append(
                            header::ACCESS_CONTROL_EXPOSE_HEADERS,
                            HeaderValue::from_static(X_PAYMENT_RESPONSE_HEADER),
                        );
                    }
                    Ok(response)
                }
                Err(err) => Ok(error_response(&err)),
            }
        })
    }
}

/// Body of an error response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    x402_version: X402V1,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    accepts: Option<[&'a PaymentRequirement; 1]>,
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            Body::from(bytes),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize response body");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `402 Payment Required` with the requirement the client must satisfy.
fn payment_required_response(requirement: PaymentRequirement) -> Response {
    json_response(
        StatusCode::PAYMENT_REQUIRED,
        &PaymentRequired::new(requirement),
    )
}

fn error_response(err: &PaymentError) -> Response {
    let body = ErrorBody {
        x402_version: X402V1,
        error: err.public_message(),
        accepts: err.requirement().map(|requirement| [requirement]),
    };
    json_response(err.status_code(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::{decode_settlement, encode_payment_payload};
    use crate::server::middleware::PaymentInfo;
    use crate::server::pricing::PathBased;
    use crate::server::settlement::SettlementMode;
    use axum::Router;
    use axum::extract::Extension;
    use axum::routing::get;
    use paygate::PaymentPayload;
    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const FEE_PAYER: &str = "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4";

    async fn facilitator() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/supported"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"kinds": [
                {"x402Version": 1, "scheme": "exact", "network": "solana-devnet",
                 "extra": {"feePayer": FEE_PAYER}}
            ]})))
            .mount(&server)
            .await;
        server
    }

    fn config(server: &MockServer) -> PaygateConfig {
        PaygateConfig::new(RECIPIENT, "solana-devnet", server.uri()).with_pricing(
            PathBased::new(Decimal::ZERO).with_price("/paid", Decimal::new(5, 2)),
        )
    }

    fn app(layer: PaygateLayer) -> Router {
        Router::new()
            .route("/free", get(|| async { "free" }))
            .route(
                "/paid",
                get(
                    |Extension(info): Extension<PaymentInfo>,
                     Extension(payment): Extension<VerifiedPayment>| async move {
                        format!("{} {} {}", info.amount, info.currency, payment.payer)
                    },
                ),
            )
            .layer(layer)
    }

    fn payment_header() -> String {
        encode_payment_payload(&PaymentPayload {
            x402_version: 1,
            scheme: "exact".into(),
            network: "solana-devnet".into(),
            payload: json!({"transaction": "AQID"}),
        })
        .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_free_route_passes_through() {
        let server = facilitator().await;
        let app = app(PaygateLayer::new(config(&server)).unwrap());
        let response = app
            .oneshot(http::Request::get("/free").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "free");
    }

    #[tokio::test]
    async fn test_unpaid_request_gets_402() {
        let server = facilitator().await;
        let app = app(PaygateLayer::new(config(&server)).unwrap());
        let response = app
            .oneshot(http::Request::get("/paid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["error"], "Payment required for this resource");
        let accepts = body["accepts"].as_array().unwrap();
        assert_eq!(accepts.len(), 1);
        assert_eq!(accepts[0]["maxAmountRequired"], "50000");
        assert_eq!(accepts[0]["network"], "solana-devnet");
        assert_eq!(accepts[0]["extra"]["feePayer"], FEE_PAYER);
    }

    #[tokio::test]
    async fn test_verified_request_sees_payment_info() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"isValid": true, "payer": "P1"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/settle"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"success": true, "transaction": "5sig", "network": "solana-devnet"}),
            ))
            .mount(&server)
            .await;

        let layer = PaygateLayer::new(
            config(&server).with_settlement_mode(SettlementMode::BeforeExecution),
        )
        .unwrap();
        let response = app(layer)
            .oneshot(
                http::Request::get("/paid")
                    .header("X-Payment", payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let settlement = response.headers()[X_PAYMENT_RESPONSE].to_str().unwrap().to_owned();
        assert_eq!(decode_settlement(&settlement).unwrap().transaction, "5sig");
        assert_eq!(body_text(response).await, "0.05 USDC P1");
    }

    #[tokio::test]
    async fn test_rejected_payment_gets_error_body() {
        let server = facilitator().await;
        Mock::given(method("POST"))
            .and(path("/verify"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"isValid": false, "invalidReason": "expired"})),
            )
            .mount(&server)
            .await;

        let app = app(PaygateLayer::new(config(&server)).unwrap());
        let response = app
            .oneshot(
                http::Request::get("/paid")
                    .header("x-payment", payment_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(response.headers().get(X_PAYMENT_RESPONSE).is_none());
        let body = body_json(response).await;
        assert_eq!(body["x402Version"], 1);
        assert_eq!(body["error"], "Payment verification failed: expired");
        assert_eq!(body["accepts"][0]["payTo"], RECIPIENT);
    }

    #[tokio::test]
    async fn test_facilitator_outage_is_500() {
        let server = MockServer::start().await;
        let app = app(PaygateLayer::new(config(&server)).unwrap());
        let response = app
            .oneshot(http::Request::get("/paid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Payment processing error");
        assert!(body.get("accepts").is_none());
    }
}
