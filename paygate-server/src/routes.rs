//! Axum routes of the example server.
//!
//! Which routes cost money is decided by the configured pricing, not here:
//! handlers only look at the [`VerifiedPayment`] the payment layer attaches.

use std::sync::Arc;

use axum::extract::{Query, Request, State};
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use paygate_http::constants::{X_PAYMENT_RESPONSE, X_PAYMENT_RESPONSE_HEADER};
use paygate_http::server::{PaygateLayer, PaymentProcessor, VerifiedPayment};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors;
use tower_http::trace::TraceLayer;

/// Builds the application router with payment enforcement applied to every
/// route.
#[must_use]
pub fn router(processor: Arc<PaymentProcessor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/api/weather", get(weather))
        .route("/api/premium/report", get(report))
        .with_state(Arc::clone(&processor))
        .layer(PaygateLayer::from_processor(processor))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any)
                .expose_headers([X_PAYMENT_RESPONSE]),
        )
}

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "paymentResponseHeader": X_PAYMENT_RESPONSE_HEADER,
    }))
}

/// Background settlement counters.
async fn stats(State(processor): State<Arc<PaymentProcessor>>) -> Json<Value> {
    let stats = processor.settlement_stats();
    Json(json!({
        "network": processor.middleware().network().as_str(),
        "settlement": stats.map(|s| json!({
            "submitted": s.submitted,
            "settled": s.settled,
            "failed": s.failed,
            "rejected": s.rejected,
        })),
    }))
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    #[serde(default = "default_city")]
    city: String,
}

fn default_city() -> String {
    "Lisbon".to_owned()
}

async fn weather(Query(query): Query<WeatherQuery>, request: Request) -> Json<Value> {
    let payment = request.extensions().get::<VerifiedPayment>();
    Json(json!({
        "city": query.city,
        "temperatureC": 21,
        "conditions": "sunny",
        "paid": payment.is_some(),
        "payer": payment.map(|p| p.payer.as_str()),
    }))
}

async fn report(request: Request) -> Json<Value> {
    let payment = request.extensions().get::<VerifiedPayment>();
    Json(json!({
        "report": "Markets were calm.",
        "amount": payment.map(|p| p.info.amount.to_string()),
        "currency": payment.map(|p| p.info.currency.as_str()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use paygate_http::server::PaygateConfig;
    use paygate_http::server::pricing::Fixed;
    use rust_decimal::Decimal;
    use tower::ServiceExt;

    fn free_processor() -> Arc<PaymentProcessor> {
        let config = PaygateConfig::new(
            "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            "solana-devnet",
            "http://127.0.0.1:9",
        )
        .with_pricing(Fixed::new(Decimal::ZERO));
        Arc::new(PaymentProcessor::new(config).unwrap())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(axum::http::Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(router(free_processor()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_free_weather_is_unpaid() {
        let (status, body) = get_json(router(free_processor()), "/api/weather?city=Oslo").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["city"], "Oslo");
        assert_eq!(body["paid"], false);
        assert!(body["payer"].is_null());
    }

    #[tokio::test]
    async fn test_stats() {
        let (_, body) = get_json(router(free_processor()), "/stats").await;
        assert_eq!(body["network"], "solana-devnet");
        assert_eq!(body["settlement"]["submitted"], 0);
    }
}
