//! Construction of USDC payment requirements.
//!
//! [`build_usdc_requirement`] turns a human-readable USDC amount (`"0.01"`)
//! into a [`PaymentRequirement`] whose `maxAmountRequired` is expressed in
//! atomic token units (`"10000"`).
//!
//! Conversion is exact: the amount is parsed as a [`Decimal`], scaled by
//! `10^decimals` and rounded half-to-even, so `"1.5"` and `"1.50"` always
//! produce the same requirement and `"0.0000005"` rounds to `0`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::chain::ChainConfig;
use crate::proto::PaymentRequirement;

/// Scheme used when none is configured.
pub const DEFAULT_SCHEME: &str = "exact";

/// Payment validity window used when none is configured.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// MIME type used when none is configured.
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// Errors produced by [`build_usdc_requirement`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequirementError {
    /// The recipient address is empty.
    #[error("recipientAddress: cannot be empty")]
    EmptyRecipient,
    /// The amount is not a decimal number.
    #[error("amount: invalid format")]
    InvalidAmount,
    /// The amount is negative.
    #[error("amount: must be non-negative")]
    NegativeAmount,
    /// The amount does not fit in 64-bit atomic units.
    #[error("amount: out of range")]
    AmountOutOfRange,
}

/// Inputs of [`build_usdc_requirement`].
///
/// Empty strings and a zero timeout select the defaults.
#[derive(Debug, Clone)]
pub struct UsdcRequirementConfig {
    /// Network and token the payment is made on.
    pub chain: &'static ChainConfig,
    /// Amount in whole USDC, e.g. `"0.01"`.
    pub amount: String,
    /// Address receiving the payment.
    pub recipient: String,
    /// Human-readable description of the resource.
    pub description: String,
    /// Payment scheme. Defaults to [`DEFAULT_SCHEME`].
    pub scheme: String,
    /// Validity window in seconds. Defaults to [`DEFAULT_MAX_TIMEOUT_SECONDS`].
    pub max_timeout_seconds: u64,
    /// MIME type of the resource. Defaults to [`DEFAULT_MIME_TYPE`].
    pub mime_type: String,
    /// URL of the resource.
    pub resource: String,
}

impl UsdcRequirementConfig {
    /// A config with every optional input left at its default.
    pub fn new(
        chain: &'static ChainConfig,
        amount: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            amount: amount.into(),
            recipient: recipient.into(),
            description: String::new(),
            scheme: String::new(),
            max_timeout_seconds: 0,
            mime_type: String::new(),
            resource: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the scheme.
    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the validity window.
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, seconds: u64) -> Self {
        self.max_timeout_seconds = seconds;
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    /// Sets the resource URL.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }
}

/// Parses a human-readable amount. Accepts plain (`"1.5"`) and scientific
/// (`"1.5e-3"`) notation.
fn parse_amount(amount: &str) -> Result<Decimal, RequirementError> {
    Decimal::from_str(amount)
        .or_else(|_| Decimal::from_scientific(amount))
        .map_err(|_| RequirementError::InvalidAmount)
}

/// Converts a whole-token amount into atomic units, rounding half-to-even.
///
/// # Errors
///
/// Returns [`RequirementError`] if the amount is malformed, negative, or
/// too large to represent.
pub fn to_atomic_units(amount: &str, decimals: u32) -> Result<u64, RequirementError> {
    let value = parse_amount(amount)?;
    if value < Decimal::ZERO {
        return Err(RequirementError::NegativeAmount);
    }
    let factor = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or(RequirementError::AmountOutOfRange)?;
    value
        .checked_mul(factor)
        .ok_or(RequirementError::AmountOutOfRange)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_u64()
        .ok_or(RequirementError::AmountOutOfRange)
}

/// Builds a USDC payment requirement.
///
/// `extra` is populated with the chain's EIP-3009 domain (`name`, `version`)
/// when it has one, and is otherwise left empty for the caller to fill in.
///
/// # Errors
///
/// Returns [`RequirementError`] if the recipient is empty or the amount is
/// not a non-negative decimal number.
pub fn build_usdc_requirement(
    config: &UsdcRequirementConfig,
) -> Result<PaymentRequirement, RequirementError> {
    if config.recipient.is_empty() {
        return Err(RequirementError::EmptyRecipient);
    }
    let atomic = to_atomic_units(&config.amount, config.chain.decimals)?;

    let mut extra = serde_json::Map::new();
    if !config.chain.eip3009_name.is_empty() {
        extra.insert("name".to_owned(), config.chain.eip3009_name.into());
        extra.insert("version".to_owned(), config.chain.eip3009_version.into());
    }

    Ok(PaymentRequirement {
        scheme: non_empty_or(&config.scheme, DEFAULT_SCHEME),
        network: config.chain.network_id.to_owned(),
        max_amount_required: atomic.to_string(),
        resource: config.resource.clone(),
        description: config.description.clone(),
        mime_type: non_empty_or(&config.mime_type, DEFAULT_MIME_TYPE),
        output_schema: None,
        pay_to: config.recipient.clone(),
        max_timeout_seconds: if config.max_timeout_seconds == 0 {
            DEFAULT_MAX_TIMEOUT_SECONDS
        } else {
            config.max_timeout_seconds
        },
        asset: config.chain.token_address.to_owned(),
        extra,
    })
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.is_empty() { default } else { value }.to_owned()
}
