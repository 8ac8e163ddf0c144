//! Error types for the example server.

use paygate::facilitators::UnknownFacilitatorId;
use paygate_http::server::ConfigError;

/// Errors that can occur while loading the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::ServerConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A price is not a decimal number.
    #[error("invalid price {value:?} for {path}: {source}")]
    InvalidPrice {
        /// Route the price belongs to, or `"default"`.
        path: String,
        /// The offending value.
        value: String,
        /// Underlying parse error.
        #[source]
        source: rust_decimal::Error,
    },

    /// Neither `facilitator_url` nor a known `facilitator` id was given.
    #[error("{0}")]
    UnknownFacilitator(#[from] UnknownFacilitatorId),

    /// The resulting middleware configuration was rejected.
    #[error(transparent)]
    Paygate(#[from] ConfigError),
}
