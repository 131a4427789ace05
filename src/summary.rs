//! Portfolio summary with concurrent enrichment.
//!
//! Balance lookups for different assets run concurrently and each failure
//! degrades only its own row; the summary itself renders regardless.

use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::lookup::{
    BalanceProvider, LookupStatus, PriceMap, PriceProvider, cached_prices, fetch_balance,
};
use crate::portfolio::store::{KeyValueStore, load_portfolio};
use crate::portfolio::{Asset, AssetCategory, Chain, PhysicalSymbol};

/// One enriched portfolio row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssetView {
    pub id: Uuid,
    pub label: String,
    pub category: AssetCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain: Option<Chain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<PhysicalSymbol>,
    pub quantity: Decimal,
    pub usd_price: Decimal,
    pub usd_value: Decimal,
    pub status: LookupStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotals {
    pub blockchain: Decimal,
    pub physical: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TotalsBreakdown {
    pub usd: Decimal,
    pub by_category: CategoryTotals,
}

/// The enriched portfolio response.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub assets: Vec<AssetView>,
    pub totals: TotalsBreakdown,
    pub prices: PriceMap,
}

/// Build the enriched summary for the stored portfolio.
pub async fn build_summary(
    store: &dyn KeyValueStore,
    balances: &dyn BalanceProvider,
    prices_provider: &dyn PriceProvider,
) -> Result<PortfolioSummary, StoreError> {
    let portfolio = load_portfolio(store).await?;
    let prices = cached_prices(store, prices_provider).await;

    let views = join_all(
        portfolio
            .assets
            .iter()
            .map(|asset| build_asset_view(asset, balances, &prices)),
    )
    .await;

    let totals = compute_totals(&views);
    Ok(PortfolioSummary {
        updated_at: portfolio.updated_at,
        assets: views,
        totals,
        prices,
    })
}

async fn build_asset_view(
    asset: &Asset,
    balances: &dyn BalanceProvider,
    prices: &PriceMap,
) -> AssetView {
    match asset {
        Asset::Blockchain(entry) => {
            let balance = fetch_balance(balances, entry.chain, &entry.address).await;
            let usd_price = prices.get(&balance.symbol).copied().unwrap_or_default();
            AssetView {
                id: entry.id,
                label: entry.label.clone(),
                category: AssetCategory::Blockchain,
                chain: Some(entry.chain),
                address: Some(entry.address.clone()),
                symbol: None,
                quantity: balance.quantity,
                usd_price,
                usd_value: balance.quantity * usd_price,
                status: balance.status,
                message: balance.message,
            }
        }
        Asset::Physical(entry) => {
            let usd_price = prices.get(entry.symbol.as_str()).copied().unwrap_or_else(|| {
                if entry.symbol == PhysicalSymbol::Usd {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                }
            });
            let priced = usd_price > Decimal::ZERO || entry.symbol == PhysicalSymbol::Usd;
            AssetView {
                id: entry.id,
                label: entry.label.clone(),
                category: AssetCategory::Physical,
                chain: None,
                address: None,
                symbol: Some(entry.symbol),
                quantity: entry.quantity,
                usd_price,
                usd_value: entry.quantity * usd_price,
                status: if priced {
                    LookupStatus::Ok
                } else {
                    LookupStatus::Error
                },
                message: if priced {
                    None
                } else {
                    Some("Price unavailable".to_string())
                },
            }
        }
    }
}

fn compute_totals(views: &[AssetView]) -> TotalsBreakdown {
    let mut totals = TotalsBreakdown::default();
    for view in views {
        totals.usd += view.usd_value;
        match view.category {
            AssetCategory::Blockchain => totals.by_category.blockchain += view.usd_value,
            AssetCategory::Physical => totals.by_category.physical += view.usd_value,
        }
    }
    totals
}
