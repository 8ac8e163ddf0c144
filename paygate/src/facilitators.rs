//! Registry of well-known public facilitators.
//!
//! The built-in table is constructed once, on first use, into an immutable
//! [`FacilitatorRegistry`]. Applications with their own facilitators build a
//! registry from their own entries with [`FacilitatorRegistry::new`]; a
//! duplicate id is reported as a construction error.
//!
//! ```
//! use paygate::chain::Network;
//! use paygate::facilitators::{FacilitatorId, FacilitatorRegistry};
//!
//! let registry = FacilitatorRegistry::builtin();
//! let payai = registry.by_id(FacilitatorId::PayAi).unwrap();
//! assert_eq!(payai.url, "https://facilitator.payai.network");
//! assert!(!registry.supporting(Network::Solana).is_empty());
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::chain::{Network, SOLANA_MAINNET};

/// A token a facilitator can settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Mint address.
    pub address: &'static str,
    /// Decimals.
    pub decimals: u32,
    /// Ticker symbol.
    pub symbol: &'static str,
}

/// USDC on Solana mainnet.
pub const USDC_SOLANA: Token = Token {
    address: SOLANA_MAINNET.token_address,
    decimals: SOLANA_MAINNET.decimals,
    symbol: "USDC",
};

/// An on-chain address a facilitator settles from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilitatorAddress {
    /// Fee-payer address.
    pub address: &'static str,
    /// Tokens settled from this address.
    pub tokens: Vec<Token>,
    /// Date of the first observed transaction (`YYYY-MM-DD`).
    pub first_transaction: &'static str,
}

/// A public facilitator service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Facilitator {
    /// Registry id.
    pub id: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Documentation URL.
    pub docs_url: &'static str,
    /// Service base URL.
    pub url: &'static str,
    /// Addresses per supported network.
    pub addresses: BTreeMap<Network, Vec<FacilitatorAddress>>,
}

impl Facilitator {
    /// Returns `true` if the facilitator settles on `network`.
    #[must_use]
    pub fn supports(&self, network: Network) -> bool {
        self.addresses.contains_key(&network)
    }
}

/// Ids of the built-in facilitators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacilitatorId {
    /// PayAI.
    PayAi,
    /// Coinbase CDP.
    Coinbase,
    /// OpenX402.
    OpenX402,
    /// AurraCloud.
    AurraCloud,
    /// CodeNut.
    CodeNut,
    /// Corbits.
    Corbits,
    /// Daydreams.
    Daydreams,
    /// Dexter.
    Dexter,
    /// Ultravioleta DAO.
    UltravioletaDao,
}

impl FacilitatorId {
    /// Every built-in id.
    pub const ALL: [Self; 9] = [
        Self::PayAi,
        Self::Coinbase,
        Self::OpenX402,
        Self::AurraCloud,
        Self::CodeNut,
        Self::Corbits,
        Self::Daydreams,
        Self::Dexter,
        Self::UltravioletaDao,
    ];

    /// Registry id string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PayAi => "payAI",
            Self::Coinbase => "coinbase",
            Self::OpenX402 => "openx402",
            Self::AurraCloud => "aurracloud",
            Self::CodeNut => "codenut",
            Self::Corbits => "corbits",
            Self::Daydreams => "daydreams",
            Self::Dexter => "dexter",
            Self::UltravioletaDao => "ultravioletadao",
        }
    }
}

/// The id does not name a built-in facilitator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown facilitator id: {0:?}")]
pub struct UnknownFacilitatorId(pub String);

impl FromStr for FacilitatorId {
    type Err = UnknownFacilitatorId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownFacilitatorId(s.to_owned()))
    }
}

impl fmt::Display for FacilitatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry construction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Two entries share an id.
    #[error("facilitator with ID {0:?} already registered")]
    DuplicateId(&'static str),
}

/// Immutable lookup table of facilitators.
///
/// Entries keep their insertion order for listing.
#[derive(Debug, Clone)]
pub struct FacilitatorRegistry {
    entries: Vec<Facilitator>,
    by_id: HashMap<&'static str, usize>,
}

impl FacilitatorRegistry {
    /// Builds a registry from `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if two entries share an id.
    pub fn new(entries: Vec<Facilitator>) -> Result<Self, RegistryError> {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if by_id.insert(entry.id, index).is_some() {
                return Err(RegistryError::DuplicateId(entry.id));
            }
        }
        Ok(Self { entries, by_id })
    }

    /// The built-in facilitators.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Looks up a facilitator by id string.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Facilitator> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    /// Looks up a built-in facilitator by enum id.
    #[must_use]
    pub fn by_id(&self, id: FacilitatorId) -> Option<&Facilitator> {
        self.get(id.as_str())
    }

    /// Facilitators settling on `network`.
    #[must_use]
    pub fn supporting(&self, network: Network) -> Vec<&Facilitator> {
        self.entries.iter().filter(|f| f.supports(network)).collect()
    }

    /// Every facilitator.
    #[must_use]
    pub fn all(&self) -> &[Facilitator] {
        &self.entries
    }

    /// Number of facilitators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A facilitator with a single Solana mainnet USDC address.
fn solana_usdc(
    id: FacilitatorId,
    name: &'static str,
    docs_url: &'static str,
    url: &'static str,
    address: &'static str,
    first_transaction: &'static str,
) -> Facilitator {
    Facilitator {
        id: id.as_str(),
        name,
        docs_url,
        url,
        addresses: BTreeMap::from([(
            Network::Solana,
            vec![FacilitatorAddress {
                address,
                tokens: vec![USDC_SOLANA],
                first_transaction,
            }],
        )]),
    }
}

static BUILTIN: LazyLock<FacilitatorRegistry> = LazyLock::new(|| {
    use FacilitatorId as Id;
    let entries = vec![
        solana_usdc(
            Id::PayAi,
            "PayAI",
            "https://payai.network",
            "https://facilitator.payai.network",
            "2wKupLR9q6wXYppw8Gr2NvWxKBUqm4PPJKkQfoxHDBg4",
            "2025-07-01",
        ),
        solana_usdc(
            Id::Coinbase,
            "Coinbase",
            "https://docs.cdp.coinbase.com/x402/welcome",
            "https://facilitator.coinbase.com",
            "L54zkaPQFeTn1UsEqieEXBqWrPShiaZEPD7mS5WXfQg",
            "2025-10-24",
        ),
        solana_usdc(
            Id::OpenX402,
            "OpenX402",
            "https://open.x402.host",
            "https://open.x402.host",
            "5xvht4fYDs99yprfm4UeuHSLxMBRpotfBtUCQqM3oDNG",
            "2025-10-16",
        ),
        solana_usdc(
            Id::AurraCloud,
            "AurraCloud",
            "https://x402-facilitator.aurracloud.com",
            "https://x402-facilitator.aurracloud.com",
            "8x8CzkTHTYkW18frrTR7HdCV6fsjenvcykJAXWvoPQW",
            "2025-10-30",
        ),
        solana_usdc(
            Id::CodeNut,
            "CodeNut",
            "https://docs.codenut.ai/guides/x402-facilitator",
            "https://facilitator.codenut.ai",
            "HsozMJWWHNADoZRmhDGKzua6XW6NNfNDdQ4CkE9i5wHt",
            "2025-11-03",
        ),
        solana_usdc(
            Id::Corbits,
            "Corbits",
            "https://corbits.dev",
            "https://facilitator.corbits.dev",
            "AepWpq3GQwL8CeKMtZyKtKPa7W91Coygh3ropAJapVdU",
            "2025-09-21",
        ),
        solana_usdc(
            Id::Daydreams,
            "Daydreams",
            "https://facilitator.daydreams.systems",
            "https://facilitator.daydreams.systems",
            "DuQ4jFMmVABWGxabYHFkGzdyeJgS1hp4wrRuCtsJgT9a",
            "2025-10-16",
        ),
        solana_usdc(
            Id::Dexter,
            "Dexter",
            "https://facilitator.dexter.cash",
            "https://facilitator.dexter.cash",
            "DEXVS3su4dZQWTvvPnLDJLRK1CeeKG6K3QqdzthgAkNV",
            "2025-10-26",
        ),
        solana_usdc(
            Id::UltravioletaDao,
            "Ultravioleta DAO",
            "https://facilitator.ultravioletadao.xyz",
            "https://facilitator.ultravioletadao.xyz",
            "F742C4VfFLQ9zRQyithoj5229ZgtX2WqKCSFKgH2EThq",
            "2025-10-30",
        ),
    ];
    FacilitatorRegistry::new(entries).expect("built-in facilitator ids are unique")
});
