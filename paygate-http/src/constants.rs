//! HTTP-specific constants for the x402 protocol.

use http::HeaderName;

/// Header carrying the client's payment payload (client → server).
pub const X_PAYMENT_HEADER: &str = "X-Payment";

/// Header carrying the settlement result (server → client).
pub const X_PAYMENT_RESPONSE_HEADER: &str = "X-Payment-Response";

/// Currency reported in [`crate::server::PaymentInfo`].
pub const USDC_CURRENCY: &str = "USDC";

/// Typed name of [`X_PAYMENT_HEADER`].
pub const X_PAYMENT: HeaderName = HeaderName::from_static("x-payment");

/// Typed name of [`X_PAYMENT_RESPONSE_HEADER`].
pub const X_PAYMENT_RESPONSE: HeaderName = HeaderName::from_static("x-payment-response");
