//! Supported networks and their USDC deployments.
//!
//! Only two Solana clusters are supported. Each has a static [`ChainConfig`]
//! describing the USDC mint used for payment requirements.
//!
//! Network names are matched leniently when read from configuration
//! (`"Solana-Mainnet "` resolves to [`Network::Solana`]) and always emitted
//! in their canonical wire form (`"solana"`, `"solana-devnet"`).

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// Static descriptor of the payment token on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainConfig {
    /// Canonical network identifier placed in payment requirements.
    pub network_id: &'static str,
    /// Mint address of the payment token.
    pub token_address: &'static str,
    /// Number of decimals of the payment token.
    pub decimals: u32,
    /// EIP-3009 domain name. Empty on Solana.
    pub eip3009_name: &'static str,
    /// EIP-3009 domain version. Empty on Solana.
    pub eip3009_version: &'static str,
}

/// Solana mainnet with native Circle USDC.
pub const SOLANA_MAINNET: ChainConfig = ChainConfig {
    network_id: "solana",
    token_address: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    decimals: 6,
    eip3009_name: "",
    eip3009_version: "",
};

/// Solana devnet with Circle's test USDC.
pub const SOLANA_DEVNET: ChainConfig = ChainConfig {
    network_id: "solana-devnet",
    token_address: "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
    decimals: 6,
    eip3009_name: "",
    eip3009_version: "",
};

/// A supported payment network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Network {
    /// Solana mainnet-beta.
    Solana,
    /// Solana devnet.
    SolanaDevnet,
}

/// The network name is not one of the supported Solana clusters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("x402: network not supported: {0:?}")]
pub struct NetworkNotSupported(pub String);

impl Network {
    /// Every supported network, mainnet first.
    pub const ALL: [Self; 2] = [Self::Solana, Self::SolanaDevnet];

    /// Canonical wire identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.chain().network_id
    }

    /// USDC deployment for this network.
    #[must_use]
    pub const fn chain(self) -> &'static ChainConfig {
        match self {
            Self::Solana => &SOLANA_MAINNET,
            Self::SolanaDevnet => &SOLANA_DEVNET,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Solana => "Solana Mainnet",
            Self::SolanaDevnet => "Solana Devnet",
        }
    }
}

/// Resolves a configured network name to its [`ChainConfig`].
///
/// Input is trimmed and lowercased. `solana` and `solana-mainnet` both
/// resolve to mainnet.
///
/// # Errors
///
/// Returns [`NetworkNotSupported`] for any other name.
pub fn chain_for_network(network: &str) -> Result<&'static ChainConfig, NetworkNotSupported> {
    network.parse::<Network>().map(Network::chain)
}

/// Returns `true` if `network` resolves to a supported network.
#[must_use]
pub fn is_network_supported(network: &str) -> bool {
    network.parse::<Network>().is_ok()
}

impl FromStr for Network {
    type Err = NetworkNotSupported;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "solana" | "solana-mainnet" => Ok(Self::Solana),
            "solana-devnet" => Ok(Self::SolanaDevnet),
            _ => Err(NetworkNotSupported(s.to_owned())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Network {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing_is_lenient() {
        assert_eq!("solana".parse::<Network>().unwrap(), Network::Solana);
        assert_eq!(" Solana-Mainnet ".parse::<Network>().unwrap(), Network::Solana);
        assert_eq!(
            "SOLANA-DEVNET".parse::<Network>().unwrap(),
            Network::SolanaDevnet
        );
        assert!("base-sepolia".parse::<Network>().is_err());
        assert!("".parse::<Network>().is_err());
    }

    #[test]
    fn test_chain_for_network() {
        let chain = chain_for_network("solana-devnet").unwrap();
        assert_eq!(chain.network_id, "solana-devnet");
        assert_eq!(chain.token_address, SOLANA_DEVNET.token_address);
        assert_eq!(chain.decimals, 6);

        let err = chain_for_network("ethereum").unwrap_err();
        assert_eq!(err, NetworkNotSupported("ethereum".into()));
    }

    #[test]
    fn test_network_serde_uses_canonical_name() {
        let json = serde_json::to_string(&Network::Solana).unwrap();
        assert_eq!(json, "\"solana\"");
        let parsed: Network = serde_json::from_str("\"solana-mainnet\"").unwrap();
        assert_eq!(parsed, Network::Solana);
    }

    #[test]
    fn test_is_network_supported() {
        assert!(is_network_supported("solana"));
        assert!(is_network_supported(" solana-devnet"));
        assert!(!is_network_supported("solana-testnet"));
    }
}
