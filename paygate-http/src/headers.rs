//! Base64 JSON codecs for x402 HTTP headers.
//!
//! `X-Payment` carries a [`PaymentPayload`] from the client and
//! `X-Payment-Response` carries a [`SettlementResponse`] back. Payment
//! requirements use the same encoding when embedded in headers.

use base64::prelude::*;
use http::HeaderValue;
use paygate::{PaymentPayload, PaymentRequirement, SettlementResponse};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::HttpError;

fn encode<T: Serialize>(value: &T) -> Result<String, HttpError> {
    let json = serde_json::to_vec(value)?;
    Ok(BASE64_STANDARD.encode(json))
}

fn decode<T: DeserializeOwned>(header_value: &str) -> Result<T, HttpError> {
    let bytes = BASE64_STANDARD.decode(header_value.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encodes a [`PaymentPayload`] for the `X-Payment` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_payload(payload: &PaymentPayload) -> Result<String, HttpError> {
    encode(payload)
}

/// Decodes an `X-Payment` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_payment_payload(header_value: &str) -> Result<PaymentPayload, HttpError> {
    decode(header_value)
}

/// Encodes a [`PaymentRequirement`] as Base64 JSON.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_payment_requirement(requirement: &PaymentRequirement) -> Result<String, HttpError> {
    encode(requirement)
}

/// Decodes a Base64 JSON [`PaymentRequirement`].
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_payment_requirement(header_value: &str) -> Result<PaymentRequirement, HttpError> {
    decode(header_value)
}

/// Encodes a [`SettlementResponse`] for the `X-Payment-Response` header.
///
/// # Errors
///
/// Returns [`HttpError::Serialize`] if JSON serialization fails.
pub fn encode_settlement(settlement: &SettlementResponse) -> Result<String, HttpError> {
    encode(settlement)
}

/// Decodes an `X-Payment-Response` header value.
///
/// # Errors
///
/// Returns [`HttpError`] on Base64 or JSON decode failure.
pub fn decode_settlement(header_value: &str) -> Result<SettlementResponse, HttpError> {
    decode(header_value)
}

/// Encodes a [`SettlementResponse`] directly into a [`HeaderValue`].
///
/// # Errors
///
/// Returns [`HttpError`] if serialization fails.
pub fn settlement_header_value(settlement: &SettlementResponse) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(&encode_settlement(settlement)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_payment_payload_tolerates_whitespace() {
        let payload = PaymentPayload {
            x402_version: 1,
            scheme: "exact".into(),
            network: "solana".into(),
            payload: json!({"transaction": "AQID"}),
        };
        let encoded = format!("  {}\n", encode_payment_payload(&payload).unwrap());
        assert_eq!(decode_payment_payload(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_payment_payload("%%%not-base64"),
            Err(HttpError::Base64(_))
        ));
        let not_json = BASE64_STANDARD.encode(b"hello");
        assert!(matches!(
            decode_payment_payload(&not_json),
            Err(HttpError::Serialize(_))
        ));
    }

    #[test]
    fn test_settlement_header_value() {
        let settlement = SettlementResponse {
            success: true,
            transaction: "5sig".into(),
            network: "solana".into(),
            ..SettlementResponse::default()
        };
        let value = settlement_header_value(&settlement).unwrap();
        let decoded = decode_settlement(value.to_str().unwrap()).unwrap();
        assert_eq!(decoded, settlement);
    }
}
