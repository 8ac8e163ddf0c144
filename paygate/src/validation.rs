//! Structural validation of amounts, addresses and protocol messages.
//!
//! These checks catch malformed input early. They never replace
//! facilitator verification, which is the only proof a payment is real.

use regex::Regex;
use std::sync::LazyLock;

use crate::proto::{PaymentPayload, PaymentRequirement, X402_VERSION};

/// Base58 alphabet, 32 to 44 characters.
static SOLANA_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid Solana address regex")
});

/// Payment schemes accepted in requirements.
pub const SUPPORTED_SCHEMES: [&str; 3] = ["exact", "max", "subscription"];

/// Validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Amount string is empty.
    #[error("amount cannot be empty")]
    EmptyAmount,
    /// Amount is not a base-10 integer.
    #[error("invalid amount format: {0}")]
    InvalidAmount(String),
    /// Amount is zero.
    #[error("amount must be greater than 0, got: {0}")]
    NonPositiveAmount(String),
    /// Address string is empty.
    #[error("address cannot be empty")]
    EmptyAddress,
    /// Address is not a base58 Solana address.
    #[error("invalid Solana address format: {0} (expected base58 string 32-44 chars)")]
    InvalidAddress(String),
    /// Network is empty.
    #[error("network cannot be empty")]
    EmptyNetwork,
    /// Network is not one of the supported identifiers.
    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),
    /// Scheme is empty.
    #[error("scheme cannot be empty")]
    EmptyScheme,
    /// Scheme is not supported.
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
    /// Timeout is zero.
    #[error("max timeout must be positive")]
    NonPositiveTimeout,
    /// Payload carries a different protocol version.
    #[error("unsupported x402 version: {0}")]
    UnsupportedVersion(u8),
    /// Payload body is missing.
    #[error("payload cannot be nil")]
    MissingPayload,
    /// A requirement field failed validation.
    #[error("invalid requirement: {field}{source}")]
    Requirement {
        /// Prefix naming the offending field (`"payTo "`, `"asset "`, or empty).
        field: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<ValidationError>,
    },
}

impl ValidationError {
    fn in_requirement(self, field: &'static str) -> Self {
        Self::Requirement {
            field,
            source: Box::new(self),
        }
    }
}

/// Validates an atomic-unit amount: a base-10 integer greater than zero.
///
/// # Errors
///
/// Returns [`ValidationError`] if the amount is empty, malformed, or zero.
pub fn validate_amount(amount: &str) -> Result<(), ValidationError> {
    if amount.is_empty() {
        return Err(ValidationError::EmptyAmount);
    }
    let value: u128 = amount
        .parse()
        .map_err(|_| ValidationError::InvalidAmount(amount.to_owned()))?;
    if value == 0 {
        return Err(ValidationError::NonPositiveAmount(amount.to_owned()));
    }
    Ok(())
}

/// Validates a network identifier. Matching is exact: only `solana` and
/// `solana-devnet` pass.
///
/// # Errors
///
/// Returns [`ValidationError`] for an empty or unknown network.
pub fn validate_network(network: &str) -> Result<(), ValidationError> {
    match network {
        "" => Err(ValidationError::EmptyNetwork),
        "solana" | "solana-devnet" => Ok(()),
        other => Err(ValidationError::UnsupportedNetwork(other.to_owned())),
    }
}

/// Validates an address for the given network.
///
/// # Errors
///
/// Returns [`ValidationError`] if the address is empty, the network is
/// unsupported, or the address is not base58.
pub fn validate_address(address: &str, network: &str) -> Result<(), ValidationError> {
    if address.is_empty() {
        return Err(ValidationError::EmptyAddress);
    }
    validate_network(network)?;
    if SOLANA_ADDRESS.is_match(address) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAddress(address.to_owned()))
    }
}

/// Validates a payment requirement: amount, network, addresses, scheme and
/// timeout.
///
/// # Errors
///
/// Returns [`ValidationError::Requirement`] wrapping the first failure.
pub fn validate_payment_requirement(req: &PaymentRequirement) -> Result<(), ValidationError> {
    validate_amount(&req.max_amount_required).map_err(|e| e.in_requirement(""))?;
    validate_network(&req.network).map_err(|e| e.in_requirement(""))?;
    validate_address(&req.pay_to, &req.network).map_err(|e| e.in_requirement("payTo "))?;
    validate_address(&req.asset, &req.network).map_err(|e| e.in_requirement("asset "))?;
    match req.scheme.as_str() {
        "" => return Err(ValidationError::EmptyScheme.in_requirement("")),
        s if !SUPPORTED_SCHEMES.contains(&s) => {
            return Err(ValidationError::UnsupportedScheme(s.to_owned()).in_requirement(""));
        }
        _ => {}
    }
    if req.max_timeout_seconds == 0 {
        return Err(ValidationError::NonPositiveTimeout.in_requirement(""));
    }
    Ok(())
}

/// Validates the structure of a client payment payload.
///
/// # Errors
///
/// Returns [`ValidationError`] for a wrong version, empty scheme or network,
/// an unsupported network, or a null payload.
pub fn validate_payment_payload(payment: &PaymentPayload) -> Result<(), ValidationError> {
    if payment.x402_version != X402_VERSION {
        return Err(ValidationError::UnsupportedVersion(payment.x402_version));
    }
    if payment.scheme.is_empty() {
        return Err(ValidationError::EmptyScheme);
    }
    validate_network(&payment.network)?;
    if payment.payload.is_null() {
        return Err(ValidationError::MissingPayload);
    }
    Ok(())
}
