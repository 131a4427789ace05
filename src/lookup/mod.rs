//! Read-only enrichment: on-chain balances and market prices.
//!
//! Lookups are pluggable collaborators behind traits. Failures degrade the
//! single affected value to zero with an error status; they never abort
//! sibling lookups or the overall summary.

mod balance;
mod price;

pub use balance::HttpBalanceProvider;
pub use price::{
    HttpPriceProvider, PRICES_KEY, PriceMap, PriceSnapshot, cached_prices, fetch_fresh_prices,
    refresh_prices,
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::portfolio::Chain;

/// Status of a single degraded-or-ok external value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LookupStatus {
    Ok,
    Error,
}

/// Result of one balance lookup, degraded on failure.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BalanceResult {
    pub symbol: String,
    pub quantity: Decimal,
    pub status: LookupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pluggable native-balance source.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn native_balance(&self, chain: Chain, address: &str) -> Result<Decimal, LookupError>;
}

/// Spot prices for the supported chains' native currencies.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CryptoPrices {
    pub btc: Decimal,
    pub eth: Decimal,
    pub sol: Decimal,
}

/// Pluggable market-price source.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn crypto_prices(&self) -> Result<CryptoPrices, LookupError>;
    async fn gold_price(&self) -> Result<Decimal, LookupError>;
}

/// Fetch one balance, catching provider failures into a zero-value error
/// result for that asset alone.
pub async fn fetch_balance(
    provider: &dyn BalanceProvider,
    chain: Chain,
    address: &str,
) -> BalanceResult {
    match provider.native_balance(chain, address).await {
        Ok(quantity) => BalanceResult {
            symbol: chain.ticker().to_string(),
            quantity,
            status: LookupStatus::Ok,
            message: None,
        },
        Err(error) => {
            tracing::warn!(chain = chain.as_str(), %error, "balance lookup failed");
            BalanceResult {
                symbol: chain.ticker().to_string(),
                quantity: Decimal::ZERO,
                status: LookupStatus::Error,
                message: Some(error.to_string()),
            }
        }
    }
}
