//! Example server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//! recipient = "$PAYGATE_RECIPIENT"
//! network = "solana-devnet"
//! facilitator = "payAI"
//! default_price = "0"
//! settlement_mode = "background"
//!
//! [[routes]]
//! path = "/api/weather"
//! price = "0.001"
//! description = "Current weather for a city"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Any variable referenced by `$VAR` in the config file

use std::borrow::Cow;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use paygate::facilitators::{FacilitatorRegistry, UnknownFacilitatorId};
use paygate::timeouts::Timeouts;
use paygate_http::server::pricing::PathBased;
use paygate_http::server::providers::{PathResources, ResourceMetadata};
use paygate_http::server::{PaygateConfig, SettlementMode};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public base URL used for resource URLs in payment requirements.
    #[serde(default)]
    pub public_url: String,

    /// Address receiving payments.
    #[serde(default)]
    pub recipient: String,

    /// `"solana"` or `"solana-devnet"`.
    #[serde(default = "default_network")]
    pub network: String,

    /// Facilitator base URL. Takes precedence over `facilitator`.
    #[serde(default)]
    pub facilitator_url: Option<String>,

    /// Id of a built-in facilitator, e.g. `"payAI"`.
    #[serde(default)]
    pub facilitator: Option<String>,

    /// Fee payer used when the facilitator advertises none.
    #[serde(default)]
    pub fee_payer: Option<String>,

    /// Fee-payer cache lifetime in seconds (default: 300).
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Timeout of every facilitator call in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub facilitator_timeout_secs: u64,

    /// Price of routes not listed in `routes`, in USDC (default: `"0"`).
    #[serde(default = "default_price")]
    pub default_price: String,

    /// When verified payments are settled.
    #[serde(default)]
    pub settlement_mode: SettlementModeConfig,

    /// Concurrent background settlements.
    #[serde(default = "default_settlement_workers")]
    pub settlement_workers: usize,

    /// Queued background settlements.
    #[serde(default = "default_settlement_queue_capacity")]
    pub settlement_queue_capacity: usize,

    /// Priced routes.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Price and metadata of one route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Exact request path.
    pub path: String,
    /// Price in USDC as a decimal string, e.g. `"0.01"`.
    pub price: String,
    /// Description placed in the payment requirement.
    #[serde(default)]
    pub description: String,
}

/// Serialized form of [`SettlementMode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementModeConfig {
    /// Settle in the background after verification.
    #[default]
    Background,
    /// Settle before running the handler.
    BeforeExecution,
}

impl From<SettlementModeConfig> for SettlementMode {
    fn from(mode: SettlementModeConfig) -> Self {
        match mode {
            SettlementModeConfig::Background => Self::Background,
            SettlementModeConfig::BeforeExecution => Self::BeforeExecution,
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4021
}

fn default_network() -> String {
    "solana-devnet".to_owned()
}

const fn default_cache_ttl() -> u64 {
    300
}

const fn default_timeout() -> u64 {
    10
}

fn default_price() -> String {
    "0".to_owned()
}

const fn default_settlement_workers() -> usize {
    PaygateConfig::DEFAULT_SETTLEMENT_WORKERS
}

const fn default_settlement_queue_capacity() -> usize {
    PaygateConfig::DEFAULT_SETTLEMENT_QUEUE_CAPACITY
}

impl ServerConfig {
    /// Loads configuration from the path given by the `CONFIG` environment
    /// variable, falling back to `config.toml` in the current directory.
    ///
    /// After loading, all string values with `$VAR` / `${VAR}` references
    /// are expanded from the process environment. `HOST` and `PORT` env vars
    /// override the file values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load() -> Result<Self, ServerError> {
        let path = std::env::var("CONFIG").unwrap_or_else(|_| "config.toml".to_owned());
        Self::load_from(&path)
    }

    /// Loads configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ServerError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ServerError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            // Without a file everything comes from defaults and the environment
            String::new()
        };

        let mut config = Self::parse(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }

    /// Parses TOML after expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Parse`] if the content is not a valid configuration.
    pub fn parse(content: &str) -> Result<Self, ServerError> {
        Ok(toml::from_str(&expand_env_vars(content))?)
    }

    /// Resolves the facilitator base URL, looking ids up in the built-in
    /// registry.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownFacilitator`] if the id is not known.
    pub fn facilitator_url(&self) -> Result<String, ServerError> {
        if let Some(url) = self.facilitator_url.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.to_owned());
        }
        match self.facilitator.as_deref() {
            Some(id) => FacilitatorRegistry::builtin()
                .get(id)
                .map(|facilitator| facilitator.url.to_owned())
                .ok_or_else(|| UnknownFacilitatorId(id.to_owned()).into()),
            // Rejected by validation as a missing facilitator
            None => Ok(String::new()),
        }
    }

    /// Builds the middleware configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a price does not parse or the facilitator is unknown.
    pub fn to_paygate_config(&self) -> Result<PaygateConfig, ServerError> {
        let default = parse_price("default", &self.default_price)?;
        let mut pricing = PathBased::new(default);
        let mut resources = PathResources::new(self.public_url.trim_end_matches('/'));
        for route in &self.routes {
            pricing = pricing.with_price(&route.path, parse_price(&route.path, &route.price)?);
            if !route.description.is_empty() {
                resources = resources
                    .with_resource(&route.path, ResourceMetadata::new("", &route.description));
            }
        }

        let mut config = PaygateConfig::new(&self.recipient, &self.network, self.facilitator_url()?)
            .with_pricing(pricing)
            .with_resource_provider(resources)
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_timeouts(Timeouts::uniform(Duration::from_secs(
                self.facilitator_timeout_secs,
            )))
            .with_settlement_mode(self.settlement_mode.into())
            .with_settlement_workers(self.settlement_workers)
            .with_settlement_queue_capacity(self.settlement_queue_capacity);
        if let Some(fee_payer) = &self.fee_payer {
            config = config.with_fee_payer(fee_payer);
        }
        Ok(config)
    }
}

fn parse_price(path: &str, value: &str) -> Result<Decimal, ServerError> {
    Decimal::from_str(value.trim()).map_err(|source| ServerError::InvalidPrice {
        path: path.to_owned(),
        value: value.to_owned(),
        source,
    })
}

/// `${NAME}` (possibly empty) or `$NAME`.
static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]*)\}|\$([A-Za-z0-9_]+)").expect("valid env var regex")
});

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables, `${}` and lone `$` are left as-is.
fn expand_env_vars(input: &str) -> Cow<'_, str> {
    ENV_VAR.replace_all(input, |caps: &Captures<'_>| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|name| name.as_str())
            .filter(|name| !name.is_empty())
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_else(|| caps[0].to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";

    #[test]
    fn test_defaults_from_empty_file() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.port, 4021);
        assert_eq!(config.network, "solana-devnet");
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.settlement_mode, SettlementModeConfig::Background);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_expand_env_vars() {
        // PATH is set in every test environment
        let path = std::env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("a=$PATH"), format!("a={path}"));
        assert_eq!(expand_env_vars("a=${PATH}!"), format!("a={path}!"));
        assert_eq!(
            expand_env_vars("x=$PAYGATE_SURELY_UNSET_VAR"),
            "x=$PAYGATE_SURELY_UNSET_VAR"
        );
        assert_eq!(
            expand_env_vars("x=${PAYGATE_SURELY_UNSET_VAR}"),
            "x=${PAYGATE_SURELY_UNSET_VAR}"
        );
        assert_eq!(expand_env_vars("cost $ 5"), "cost $ 5");
        assert_eq!(expand_env_vars("a=${}b"), "a=${}b");
        assert_eq!(expand_env_vars("a=${PATH"), "a=${PATH");
    }

    #[test]
    fn test_routes_and_mode() {
        let config = ServerConfig::parse(&format!(
            r#"
            recipient = "{RECIPIENT}"
            facilitator_url = "https://f.example"
            settlement_mode = "before_execution"

            [[routes]]
            path = "/api/weather"
            price = "0.001"
            description = "Weather"
            "#
        ))
        .unwrap();
        assert_eq!(config.settlement_mode, SettlementModeConfig::BeforeExecution);
        assert_eq!(config.routes[0].price, "0.001");

        let paygate = config.to_paygate_config().unwrap();
        assert_eq!(paygate.settlement_mode, SettlementMode::BeforeExecution);
        assert_eq!(paygate.facilitator_url, "https://f.example");
        assert!(paygate.validate().is_ok());
    }

    #[test]
    fn test_facilitator_from_registry() {
        let config = ServerConfig::parse(r#"facilitator = "payAI""#).unwrap();
        assert_eq!(
            config.facilitator_url().unwrap(),
            FacilitatorRegistry::builtin().get("payAI").unwrap().url
        );

        let config = ServerConfig::parse(r#"facilitator = "nobody""#).unwrap();
        assert!(matches!(
            config.facilitator_url(),
            Err(ServerError::UnknownFacilitator(_))
        ));
    }

    #[test]
    fn test_invalid_price() {
        let config = ServerConfig::parse(
            r#"
            [[routes]]
            path = "/x"
            price = "one dollar"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.to_paygate_config(),
            Err(ServerError::InvalidPrice { path, .. }) if path == "/x"
        ));
    }
}
