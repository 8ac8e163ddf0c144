//! Wire format of x402 version 1 messages.
//!
//! All types serialize to JSON using camelCase field names.
//!
//! # Key Types
//!
//! - [`PaymentRequirement`] - Terms the server sets for a paid resource
//! - [`PaymentPayload`] - Signed authorization presented by the client
//! - [`PaymentRequired`] - Body of a `402 Payment Required` response
//! - [`FacilitatorRequest`] - Body of facilitator `/verify` and `/settle` calls
//! - [`VerifyResponse`] / [`SettlementResponse`] - Facilitator answers
//! - [`SupportedResponse`] - Facilitator `/supported` answer

use serde::{Deserialize, Serialize};
use serde_with::{VecSkipError, serde_as};

use crate::schema::EndpointSchema;

mod version;

pub use version::{X402_VERSION, X402V1};

/// Payment terms for a protected resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme (e.g. `"exact"`).
    pub scheme: String,
    /// Network identifier (e.g. `"solana"`).
    pub network: String,
    /// Amount in atomic token units, as a decimal integer string.
    pub max_amount_required: String,
    /// URL of the resource being paid for.
    #[serde(default)]
    pub resource: String,
    /// Human-readable description of the resource.
    #[serde(default)]
    pub description: String,
    /// MIME type of the resource.
    #[serde(default)]
    pub mime_type: String,
    /// Optional description of how to call the resource and what it returns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<EndpointSchema>,
    /// Recipient address.
    pub pay_to: String,
    /// Maximum time in seconds the payment authorization stays valid.
    pub max_timeout_seconds: u64,
    /// Token mint address.
    pub asset: String,
    /// Scheme-specific extras (`feePayer`, EIP-3009 `name`/`version`).
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PaymentRequirement {
    /// Returns the fee payer advertised in `extra.feePayer`, if any.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra.get("feePayer").and_then(serde_json::Value::as_str)
    }

    /// Sets `extra.feePayer`.
    pub fn set_fee_payer(&mut self, fee_payer: impl Into<String>) {
        self.extra
            .insert("feePayer".to_owned(), serde_json::Value::String(fee_payer.into()));
    }
}

/// A signed payment authorization sent by the client in the `X-Payment` header.
///
/// The version is kept as a plain integer so that structurally valid
/// payloads of other versions decode and can be rejected by validation with
/// a precise message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version.
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: String,
    /// Network identifier.
    pub network: String,
    /// Scheme-specific signed payload. Opaque to the server.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PaymentPayload {
    /// Best-effort payer extraction from `payload.authorization.from`.
    ///
    /// Returns an empty string if the field is absent.
    #[must_use]
    pub fn authorization_from(&self) -> String {
        self.payload
            .pointer("/authorization/from")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned()
    }
}

/// Body of a `402 Payment Required` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Always `1`.
    pub x402_version: X402V1,
    /// Why payment is required.
    pub error: String,
    /// Acceptable payment options.
    pub accepts: Vec<PaymentRequirement>,
}

impl PaymentRequired {
    /// Default message of a 402 response.
    pub const DEFAULT_ERROR: &'static str = "Payment required for this resource";

    /// Builds a 402 body for a single requirement.
    #[must_use]
    pub fn new(requirement: PaymentRequirement) -> Self {
        Self {
            x402_version: X402V1,
            error: Self::DEFAULT_ERROR.to_owned(),
            accepts: vec![requirement],
        }
    }

    /// Replaces the error message.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }
}

/// Body of a facilitator `POST /verify` or `POST /settle` call.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacilitatorRequest<'a> {
    /// Always `1`.
    pub x402_version: X402V1,
    /// The client's payment.
    pub payment_payload: &'a PaymentPayload,
    /// The server's terms.
    pub payment_requirements: &'a PaymentRequirement,
}

impl<'a> FacilitatorRequest<'a> {
    /// Pairs a payment with the requirement it is meant to satisfy.
    #[must_use]
    pub const fn new(
        payment_payload: &'a PaymentPayload,
        payment_requirements: &'a PaymentRequirement,
    ) -> Self {
        Self {
            x402_version: X402V1,
            payment_payload,
            payment_requirements,
        }
    }
}

/// Facilitator answer to `POST /verify`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the payment is acceptable.
    pub is_valid: bool,
    /// Why the payment was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Address of the paying account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// Facilitator answer to `POST /settle`, also sent to clients in the
/// `X-Payment-Response` header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResponse {
    /// Whether the payment landed on chain.
    pub success: bool,
    /// Why settlement failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Transaction signature.
    #[serde(default)]
    pub transaction: String,
    /// Network the transaction was sent to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
    /// Address of the paying account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

/// One payment kind a facilitator supports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version.
    pub x402_version: u8,
    /// Payment scheme.
    pub scheme: String,
    /// Network identifier.
    pub network: String,
    /// Kind-specific extras. On Solana this carries `feePayer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl SupportedKind {
    /// Returns `extra.feePayer` if present and not blank.
    #[must_use]
    pub fn fee_payer(&self) -> Option<&str> {
        self.extra
            .as_ref()?
            .get("feePayer")?
            .as_str()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Facilitator answer to `GET /supported`.
///
/// Kinds that fail to decode are skipped rather than failing the whole list.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    /// Supported payment kinds.
    #[serde_as(as = "VecSkipError<_>")]
    pub kinds: Vec<SupportedKind>,
}

impl SupportedResponse {
    /// Finds the fee payer advertised for `network`.
    ///
    /// The first kind whose network matches (trimmed, case-insensitive)
    /// decides the answer: if it carries no fee payer the result is `None`
    /// even if a later kind for the same network does.
    #[must_use]
    pub fn fee_payer_for(&self, network: &str) -> Option<&str> {
        let target = network.trim();
        self.kinds
            .iter()
            .find(|kind| kind.network.trim().eq_ignore_ascii_case(target))
            .and_then(SupportedKind::fee_payer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fee_payer_lookup_first_match_decides() {
        let supported: SupportedResponse = serde_json::from_value(json!({
            "kinds": [
                {"x402Version": 1, "scheme": "exact", "network": "Solana-Devnet"},
                {"x402Version": 1, "scheme": "exact", "network": "solana-devnet",
                 "extra": {"feePayer": "late"}},
                {"x402Version": 1, "scheme": "exact", "network": "solana",
                 "extra": {"feePayer": "FEE"}},
                {"x402Version": 1, "scheme": "exact", "network": "solana-x",
                 "extra": {"feePayer": "  "}},
            ]
        }))
        .unwrap();
        assert_eq!(supported.fee_payer_for(" SOLANA "), Some("FEE"));
        assert_eq!(supported.fee_payer_for("solana-devnet"), None);
        assert_eq!(supported.fee_payer_for("solana-x"), None);
        assert_eq!(supported.fee_payer_for("base"), None);
    }

    #[test]
    fn test_supported_skips_malformed_kinds() {
        let supported: SupportedResponse = serde_json::from_value(json!({
            "kinds": [
                {"scheme": "exact"},
                {"x402Version": 1, "scheme": "exact", "network": "solana"}
            ]
        }))
        .unwrap();
        assert_eq!(supported.kinds.len(), 1);
    }

    #[test]
    fn test_authorization_from_fallback() {
        let payload = PaymentPayload {
            x402_version: 1,
            scheme: "exact".into(),
            network: "solana".into(),
            payload: json!({"authorization": {"from": "PAYER"}}),
        };
        assert_eq!(payload.authorization_from(), "PAYER");

        let opaque = PaymentPayload {
            payload: json!({"transaction": "base64tx"}),
            ..payload
        };
        assert_eq!(opaque.authorization_from(), "");
    }

    #[test]
    fn test_payment_required_wire_shape() {
        let requirement = PaymentRequirement {
            scheme: "exact".into(),
            network: "solana".into(),
            max_amount_required: "10000".into(),
            resource: String::new(),
            description: String::new(),
            mime_type: "application/json".into(),
            output_schema: None,
            pay_to: "PAY".into(),
            max_timeout_seconds: 300,
            asset: "ASSET".into(),
            extra: serde_json::Map::new(),
        };
        let value = serde_json::to_value(PaymentRequired::new(requirement)).unwrap();
        assert_eq!(value["x402Version"], 1);
        assert_eq!(value["error"], PaymentRequired::DEFAULT_ERROR);
        assert_eq!(value["accepts"][0]["maxAmountRequired"], "10000");
        assert_eq!(value["accepts"][0]["payTo"], "PAY");
        assert!(value["accepts"][0].get("outputSchema").is_none());
    }

    #[test]
    fn test_version_marker_rejects_other_versions() {
        assert!(serde_json::from_value::<X402V1>(json!(1)).is_ok());
        assert!(serde_json::from_value::<X402V1>(json!(2)).is_err());
    }
}
