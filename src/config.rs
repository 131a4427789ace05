//! Configuration for poma.
//!
//! Settings come from env vars (with `.env` files loaded first). Everything
//! has a sensible default except the model collaborator, which stays off
//! unless a base URL is configured; the engine then plans with the
//! deterministic heuristic fallback.

use std::net::SocketAddr;
use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_MODEL: &str = "llama-3-8b-instruct";
pub const DEFAULT_BITCOIN_API_URL: &str = "https://blockchain.info";
pub const DEFAULT_ETHEREUM_RPC_URL: &str = "https://cloudflare-eth.com";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const DEFAULT_COINGECKO_URL: &str =
    "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin,ethereum,solana&vs_currencies=usd";
pub const DEFAULT_GOLD_PRICE_URL: &str = "https://data-asg.goldprice.org/dbXRates/USD";

/// Path to the poma-specific `.env` file: `~/.poma/.env`.
pub fn poma_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".poma")
        .join(".env")
}

/// Load env vars from `./.env` and then `~/.poma/.env`.
///
/// dotenvy never overwrites existing vars, so the effective priority is:
/// explicit env vars > `./.env` > `~/.poma/.env`.
pub fn load_env() {
    let _ = dotenvy::dotenv();
    let path = poma_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

fn default_store_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".poma")
        .join("store.json")
}

/// Main configuration for the engine.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub llm: Option<LlmConfig>,
    pub lookup: LookupConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_addr: SocketAddr,
}

/// Model collaborator settings (OpenAI-compatible chat completions).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub model: String,
}

/// Endpoints for balance and price lookups.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    pub bitcoin_api_url: String,
    pub ethereum_rpc_url: String,
    pub solana_rpc_url: String,
    pub coingecko_url: String,
    pub gold_price_url: String,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Config {
    /// Build the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = optional_env("POMA_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|error| ConfigError::InvalidValue {
                key: "POMA_BIND_ADDR".to_string(),
                message: error.to_string(),
            })?;

        let llm = optional_env("LLM_BASE_URL")
            .map(|base_url| -> Result<LlmConfig, ConfigError> {
                validate_url("LLM_BASE_URL", &base_url)?;
                Ok(LlmConfig {
                    base_url,
                    api_key: optional_env("LLM_API_KEY").map(SecretString::from),
                    model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                })
            })
            .transpose()?;

        let lookup = LookupConfig {
            bitcoin_api_url: url_env("BITCOIN_API_URL", DEFAULT_BITCOIN_API_URL)?,
            ethereum_rpc_url: url_env("ETHEREUM_RPC_URL", DEFAULT_ETHEREUM_RPC_URL)?,
            solana_rpc_url: url_env("SOLANA_RPC_URL", DEFAULT_SOLANA_RPC_URL)?,
            coingecko_url: url_env("COINGECKO_API_URL", DEFAULT_COINGECKO_URL)?,
            gold_price_url: url_env("GOLD_PRICE_URL", DEFAULT_GOLD_PRICE_URL)?,
        };

        let store = StoreConfig {
            path: optional_env("POMA_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_path),
        };

        Ok(Self {
            http: HttpConfig { bind_addr },
            llm,
            lookup,
            store,
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn validate_url(key: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value).map_err(|error| ConfigError::InvalidValue {
        key: key.to_string(),
        message: error.to_string(),
    })?;
    Ok(())
}

fn url_env(key: &str, default: &str) -> Result<String, ConfigError> {
    let value = optional_env(key).unwrap_or_else(|| default.to_string());
    validate_url(key, &value)?;
    Ok(value)
}
