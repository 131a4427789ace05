//! HTTP balance provider for the supported chains.
//!
//! Each chain's public API reports balances in base units; the raw integers
//! go through the exact converter rather than float division.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::config::LookupConfig;
use crate::error::LookupError;
use crate::lookup::BalanceProvider;
use crate::portfolio::Chain;
use crate::units::base_units_to_decimal;

/// Balance source backed by public chain APIs.
pub struct HttpBalanceProvider {
    http: reqwest::Client,
    bitcoin_api_url: String,
    ethereum_rpc_url: String,
    solana_rpc_url: String,
}

impl HttpBalanceProvider {
    pub fn new(config: &LookupConfig) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            bitcoin_api_url: config.bitcoin_api_url.trim_end_matches('/').to_string(),
            ethereum_rpc_url: config.ethereum_rpc_url.clone(),
            solana_rpc_url: config.solana_rpc_url.clone(),
        })
    }

    async fn bitcoin_balance(&self, address: &str) -> Result<Decimal, LookupError> {
        let url = format!(
            "{}/rawaddr/{}?limit=0",
            self.bitcoin_api_url,
            urlencoding::encode(address)
        );
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::UpstreamStatus {
                provider: "blockchain.info",
                status: response.status().as_u16(),
            });
        }

        let payload: BitcoinAddressResponse = response.json().await?;
        let satoshis = payload.final_balance.unwrap_or(0);
        Ok(base_units_to_decimal(
            satoshis as i128,
            Chain::Bitcoin.base_unit_decimals(),
        )?)
    }

    async fn ethereum_balance(&self, address: &str) -> Result<Decimal, LookupError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [address, "latest"],
        });
        let response = self.http.post(&self.ethereum_rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::UpstreamStatus {
                provider: "ethereum",
                status: response.status().as_u16(),
            });
        }

        let payload: JsonRpcEnvelope<String> = response.json().await?;
        if let Some(error) = payload.error {
            return Err(LookupError::Rpc {
                provider: "ethereum",
                message: error.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let wei = parse_hex_quantity(payload.result.as_deref().unwrap_or("0x0"))?;
        Ok(base_units_to_decimal(
            wei,
            Chain::Ethereum.base_unit_decimals(),
        )?)
    }

    async fn solana_balance(&self, address: &str) -> Result<Decimal, LookupError> {
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBalance",
            "params": [address],
        });
        let response = self.http.post(&self.solana_rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(LookupError::UpstreamStatus {
                provider: "solana",
                status: response.status().as_u16(),
            });
        }

        let payload: JsonRpcEnvelope<SolanaBalanceValue> = response.json().await?;
        if let Some(error) = payload.error {
            return Err(LookupError::Rpc {
                provider: "solana",
                message: error.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let lamports = payload
            .result
            .and_then(|result| result.value)
            .unwrap_or(0);
        Ok(base_units_to_decimal(
            lamports as i128,
            Chain::Solana.base_unit_decimals(),
        )?)
    }
}

#[async_trait]
impl BalanceProvider for HttpBalanceProvider {
    async fn native_balance(&self, chain: Chain, address: &str) -> Result<Decimal, LookupError> {
        match chain {
            Chain::Bitcoin => self.bitcoin_balance(address).await,
            Chain::Ethereum => self.ethereum_balance(address).await,
            Chain::Solana => self.solana_balance(address).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BitcoinAddressResponse {
    #[serde(default)]
    final_balance: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcEnvelope<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SolanaBalanceValue {
    #[serde(default)]
    value: Option<u64>,
}

fn parse_hex_quantity(raw: &str) -> Result<i128, LookupError> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .or_else(|| raw.trim().strip_prefix("0X"))
        .unwrap_or(raw.trim());
    if digits.is_empty() {
        return Ok(0);
    }

    let value = u128::from_str_radix(digits, 16).map_err(|error| LookupError::Malformed {
        provider: "ethereum",
        reason: format!("invalid hex quantity '{raw}': {error}"),
    })?;
    i128::try_from(value).map_err(|_| LookupError::Malformed {
        provider: "ethereum",
        reason: format!("balance {value} exceeds the supported range"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_hex_wei() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0xde0b6b3a7640000").unwrap(), 1_000_000_000_000_000_000);
    }

    #[test]
    fn rejects_garbage_hex() {
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn hex_wei_to_ether() {
        let wei = parse_hex_quantity("0x1121d33597384000").unwrap();
        assert_eq!(base_units_to_decimal(wei, 18).unwrap(), dec!(1.2345));
    }
}
