//! Portfolio data model and identifier resolution.
//!
//! A portfolio is an ordered list of assets plus an update timestamp, owned
//! exclusively by the store. Mutations work on an in-memory copy and write the
//! whole document back.

pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported blockchain networks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Bitcoin,
    Ethereum,
    Solana,
}

impl Chain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoin",
            Self::Ethereum => "ethereum",
            Self::Solana => "solana",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "bitcoin" => Some(Self::Bitcoin),
            "ethereum" => Some(Self::Ethereum),
            "solana" => Some(Self::Solana),
            _ => None,
        }
    }

    /// Ticker of the chain's native currency, as used by the price sources.
    pub fn ticker(self) -> &'static str {
        match self {
            Self::Bitcoin => "BTC",
            Self::Ethereum => "ETH",
            Self::Solana => "SOL",
        }
    }

    /// Base-unit scale of each chain's external balance API: satoshis, wei,
    /// lamports.
    pub fn base_unit_decimals(self) -> u32 {
        match self {
            Self::Bitcoin => 8,
            Self::Ethereum => 18,
            Self::Solana => 9,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

/// Supported physical holdings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhysicalSymbol {
    Gold,
    Usd,
}

impl PhysicalSymbol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gold => "GOLD",
            Self::Usd => "USD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gold" => Some(Self::Gold),
            "usd" => Some(Self::Usd),
            _ => None,
        }
    }
}

impl fmt::Display for PhysicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhysicalSymbol {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or(())
    }
}

/// Asset category discriminant, also the serialized `category` tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetCategory {
    Blockchain,
    Physical,
}

/// A watched blockchain address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainAsset {
    pub id: Uuid,
    pub label: String,
    pub chain: Chain,
    pub address: String,
    pub created_at: DateTime<Utc>,
}

/// A manually tracked physical holding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalAsset {
    pub id: Uuid,
    pub label: String,
    pub symbol: PhysicalSymbol,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One portfolio holding. `id` is unique within a document and never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum Asset {
    Blockchain(BlockchainAsset),
    Physical(PhysicalAsset),
}

impl Asset {
    pub fn new_blockchain(label: impl Into<String>, chain: Chain, address: impl Into<String>) -> Self {
        Self::Blockchain(BlockchainAsset {
            id: Uuid::new_v4(),
            label: label.into(),
            chain,
            address: address.into(),
            created_at: Utc::now(),
        })
    }

    pub fn new_physical(label: impl Into<String>, symbol: PhysicalSymbol, quantity: Decimal) -> Self {
        Self::Physical(PhysicalAsset {
            id: Uuid::new_v4(),
            label: label.into(),
            symbol,
            quantity,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Blockchain(asset) => asset.id,
            Self::Physical(asset) => asset.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Blockchain(asset) => &asset.label,
            Self::Physical(asset) => &asset.label,
        }
    }

    pub fn category(&self) -> AssetCategory {
        match self {
            Self::Blockchain(_) => AssetCategory::Blockchain,
            Self::Physical(_) => AssetCategory::Physical,
        }
    }
}

/// The persisted portfolio document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioDocument {
    pub assets: Vec<Asset>,
    pub updated_at: DateTime<Utc>,
}

impl PortfolioDocument {
    pub fn empty() -> Self {
        Self {
            assets: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Find the first asset matching a free-text identifier.
///
/// Matches are exact after trimming and lowercasing, against the id, the
/// label, the address (blockchain assets) or the symbol (physical assets).
/// No fuzzy matching: acting on the wrong asset is worse than a miss.
pub fn find_asset_index(assets: &[Asset], identifier: &str) -> Option<usize> {
    let query = identifier.trim().to_lowercase();
    assets.iter().position(|asset| match asset {
        Asset::Blockchain(entry) => {
            entry.id.to_string() == query
                || entry.label.trim().to_lowercase() == query
                || entry.address.trim().to_lowercase() == query
        }
        Asset::Physical(entry) => {
            entry.id.to_string() == query
                || entry.label.trim().to_lowercase() == query
                || entry.symbol.as_str().to_lowercase() == query
        }
    })
}

/// Borrowing variant of [`find_asset_index`].
pub fn find_asset<'a>(assets: &'a [Asset], identifier: &str) -> Option<&'a Asset> {
    find_asset_index(assets, identifier).map(|index| &assets[index])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_assets() -> Vec<Asset> {
        vec![
            Asset::new_blockchain("Cold wallet", Chain::Bitcoin, "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh"),
            Asset::new_physical("Vault gold", PhysicalSymbol::Gold, dec!(2)),
        ]
    }

    #[test]
    fn resolver_matches_label_case_insensitively() {
        let assets = sample_assets();
        let found = find_asset(&assets, "  COLD WALLET ").unwrap();
        assert_eq!(found.label(), "Cold wallet");
    }

    #[test]
    fn resolver_matches_address_and_symbol() {
        let assets = sample_assets();
        assert_eq!(
            find_asset_index(&assets, "BC1QXY2KGDYGJRSQTZQ2N0YRF2493P83KKFJHX0WLH"),
            Some(0)
        );
        assert_eq!(find_asset_index(&assets, "gold"), Some(1));
    }

    #[test]
    fn resolver_matches_id() {
        let assets = sample_assets();
        let id = assets[1].id().to_string();
        assert_eq!(find_asset_index(&assets, &id), Some(1));
    }

    #[test]
    fn resolver_returns_none_on_miss() {
        let assets = sample_assets();
        assert!(find_asset(&assets, "dogecoin stash").is_none());
    }

    #[test]
    fn resolver_is_exact_not_fuzzy() {
        let assets = sample_assets();
        assert!(find_asset(&assets, "Cold").is_none());
    }

    #[test]
    fn asset_serializes_with_category_tag() {
        let asset = Asset::new_physical("Cash", PhysicalSymbol::Usd, dec!(100));
        let value = serde_json::to_value(&asset).unwrap();
        assert_eq!(value["category"], "physical");
        assert_eq!(value["symbol"], "USD");
        assert!(value["createdAt"].is_string());
    }

    #[test]
    fn document_round_trips_through_json() {
        let document = PortfolioDocument {
            assets: sample_assets(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&document).unwrap();
        assert!(value["updatedAt"].is_string());
        let parsed: PortfolioDocument = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, document);
    }
}
