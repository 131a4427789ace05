//! Key/value persistence for the portfolio document.
//!
//! The engine treats storage as a pluggable get/put-by-key JSON store. Two
//! implementations are provided: an in-memory store for tests and ephemeral
//! runs, and a single-file JSON store for single-user persistence.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};

use crate::error::StoreError;
use crate::portfolio::{Asset, PortfolioDocument};

/// Store key holding the single-user portfolio document.
pub const PORTFOLIO_KEY: &str = "portfolio:single-user";

/// Pluggable JSON key/value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }
}

/// Single-file JSON store: one object mapping keys to values.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_map(&self) -> Result<serde_json::Map<String, serde_json::Value>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let value: serde_json::Value = serde_json::from_str(&content)?;
                match value {
                    serde_json::Value::Object(map) => Ok(map),
                    _ => Ok(serde_json::Map::new()),
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Ok(serde_json::Map::new())
            }
            Err(error) => Err(StoreError::Io(error)),
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.read_map().await?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.clone());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&serde_json::Value::Object(map))?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// Load the portfolio document, seeding an empty one when the store holds
/// nothing usable under the key.
pub async fn load_portfolio(store: &dyn KeyValueStore) -> Result<PortfolioDocument, StoreError> {
    if let Some(value) = store.get(PORTFOLIO_KEY).await? {
        match serde_json::from_value::<PortfolioDocument>(value) {
            Ok(document) => return Ok(document),
            Err(error) => {
                tracing::warn!(%error, "stored portfolio is unreadable, reseeding empty document");
            }
        }
    }

    let empty = PortfolioDocument::empty();
    store
        .put(PORTFOLIO_KEY, &serde_json::to_value(&empty)?)
        .await?;
    Ok(empty)
}

/// Replace the whole portfolio document, stamping `updatedAt`.
pub async fn save_portfolio(
    store: &dyn KeyValueStore,
    assets: Vec<Asset>,
) -> Result<PortfolioDocument, StoreError> {
    let document = PortfolioDocument {
        assets,
        updated_at: Utc::now(),
    };
    store
        .put(PORTFOLIO_KEY, &serde_json::to_value(&document)?)
        .await?;
    Ok(document)
}
