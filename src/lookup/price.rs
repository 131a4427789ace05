//! Market prices with a store-backed snapshot cache.
//!
//! The crypto quote and the gold quote are fetched concurrently; either
//! failing leaves its symbols at zero without touching the other. USD is
//! pinned to 1. Snapshots are cached under `prices:latest` for a day.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::LookupConfig;
use crate::error::LookupError;
use crate::lookup::{CryptoPrices, PriceProvider};
use crate::portfolio::store::KeyValueStore;

/// Store key holding the latest price snapshot.
pub const PRICES_KEY: &str = "prices:latest";

/// USD spot price per tracked symbol.
pub type PriceMap = BTreeMap<String, Decimal>;

/// Cached price snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub prices: PriceMap,
}

/// Return cached prices when fresh enough, refreshing otherwise.
pub async fn cached_prices(store: &dyn KeyValueStore, provider: &dyn PriceProvider) -> PriceMap {
    if let Ok(Some(value)) = store.get(PRICES_KEY).await
        && let Ok(snapshot) = serde_json::from_value::<PriceSnapshot>(value)
        && Utc::now() - snapshot.timestamp < Duration::hours(24)
    {
        return snapshot.prices;
    }

    refresh_prices(store, provider).await
}

/// Fetch fresh prices and cache the snapshot. A failed cache write only logs;
/// the prices are still returned.
pub async fn refresh_prices(store: &dyn KeyValueStore, provider: &dyn PriceProvider) -> PriceMap {
    let prices = fetch_fresh_prices(provider).await;

    let snapshot = PriceSnapshot {
        timestamp: Utc::now(),
        prices: prices.clone(),
    };
    match serde_json::to_value(&snapshot) {
        Ok(value) => {
            if let Err(error) = store.put(PRICES_KEY, &value).await {
                tracing::warn!(%error, "failed to cache price snapshot");
            }
        }
        Err(error) => tracing::warn!(%error, "failed to serialize price snapshot"),
    }

    prices
}

/// Fetch crypto and gold quotes concurrently, degrading each independently.
pub async fn fetch_fresh_prices(provider: &dyn PriceProvider) -> PriceMap {
    let (crypto, gold) = tokio::join!(provider.crypto_prices(), provider.gold_price());

    let mut prices = PriceMap::new();
    prices.insert("BTC".to_string(), Decimal::ZERO);
    prices.insert("ETH".to_string(), Decimal::ZERO);
    prices.insert("SOL".to_string(), Decimal::ZERO);
    prices.insert("GOLD".to_string(), Decimal::ZERO);
    prices.insert("USD".to_string(), Decimal::ONE);

    match crypto {
        Ok(quotes) => {
            prices.insert("BTC".to_string(), quotes.btc);
            prices.insert("ETH".to_string(), quotes.eth);
            prices.insert("SOL".to_string(), quotes.sol);
        }
        Err(error) => tracing::warn!(%error, "crypto price lookup failed"),
    }

    match gold {
        Ok(quote) => {
            prices.insert("GOLD".to_string(), quote);
        }
        Err(error) => tracing::warn!(%error, "gold price lookup failed"),
    }

    prices
}

/// Price source backed by CoinGecko and goldprice.org.
pub struct HttpPriceProvider {
    http: reqwest::Client,
    coingecko_url: String,
    gold_price_url: String,
}

impl HttpPriceProvider {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            coingecko_url: config.coingecko_url.clone(),
            gold_price_url: config.gold_price_url.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CoinGeckoResponse {
    #[serde(default)]
    bitcoin: Option<UsdQuote>,
    #[serde(default)]
    ethereum: Option<UsdQuote>,
    #[serde(default)]
    solana: Option<UsdQuote>,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    #[serde(default)]
    usd: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct GoldPriceResponse {
    #[serde(default)]
    items: Vec<GoldPriceItem>,
}

#[derive(Debug, Deserialize)]
struct GoldPriceItem {
    #[serde(default, rename = "xauPrice")]
    xau_price: Option<Decimal>,
    #[serde(default, rename = "xauPriceGram24k")]
    xau_price_gram_24k: Option<Decimal>,
}

fn quote_or_zero(quote: Option<UsdQuote>) -> Decimal {
    quote.and_then(|quote| quote.usd).unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    async fn crypto_prices(&self) -> Result<CryptoPrices, LookupError> {
        let response = self.http.get(&self.coingecko_url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::UpstreamStatus {
                provider: "coingecko",
                status: response.status().as_u16(),
            });
        }

        let payload: CoinGeckoResponse = response.json().await?;
        Ok(CryptoPrices {
            btc: quote_or_zero(payload.bitcoin),
            eth: quote_or_zero(payload.ethereum),
            sol: quote_or_zero(payload.solana),
        })
    }

    async fn gold_price(&self) -> Result<Decimal, LookupError> {
        let response = self.http.get(&self.gold_price_url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::UpstreamStatus {
                provider: "goldprice",
                status: response.status().as_u16(),
            });
        }

        let payload: GoldPriceResponse = response.json().await?;
        payload
            .items
            .first()
            .and_then(|item| item.xau_price.or(item.xau_price_gram_24k))
            .filter(|price| !price.is_zero())
            .ok_or(LookupError::Malformed {
                provider: "goldprice",
                reason: "no XAU price in response".to_string(),
            })
    }
}
