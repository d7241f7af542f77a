//! # Cache Store Module
//!
//! ## Purpose
//! Persistent day-keyed storage for computed rate aggregates. The rest of
//! the Krishivedah platform talks to the same document store under other
//! collections; this module owns only the mandi-rates tree.
//!
//! ## Input/Output Specification
//! - **Input**: Cache entries keyed by `{district}_{commodity}_{date}`
//! - **Output**: Entry lookups (`get`) and best-effort writes (`put`)
//! - **Storage**: Sled embedded database, bincode-serialized documents
//!
//! ## Key Features
//! - Key-value document interface: `get(key)` and `put(key, entry)`
//! - Last writer wins; entries are never updated in place or expired
//! - Health check and statistics for the API layer

use crate::config::StorageConfig;
use crate::errors::{RatesError, Result};
use crate::CacheEntry;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Key-value document interface for the rate cache.
///
/// `get` returns `None` on a miss; `put` overwrites any existing entry for
/// the key (last writer wins, no merge).
#[async_trait]
pub trait RateCacheStore: Send + Sync {
    /// Look up the entry stored under `key`
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Store `entry` under `key`, replacing any previous document
    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;
}

/// Storage statistics
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Cache entries currently stored
    pub total_entries: usize,
    /// On-disk database size in bytes
    pub database_size_bytes: u64,
}

/// Sled-backed cache store
pub struct SledCacheStore {
    config: StorageConfig,
    db: Arc<sled::Db>,
    rates_tree: Arc<sled::Tree>,
}

impl SledCacheStore {
    /// Open the database and the rates tree
    pub async fn new(config: StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let db = sled::open(&config.db_path).map_err(|e| {
            RatesError::StoreConnectionFailed {
                db_path: config.db_path.to_string_lossy().to_string(),
                reason: e.to_string(),
            }
        })?;

        let rates_tree = db.open_tree(&config.rates_tree).map_err(|e| {
            RatesError::StoreConnectionFailed {
                db_path: config.db_path.to_string_lossy().to_string(),
                reason: format!("Failed to open rates tree: {}", e),
            }
        })?;

        let store = Self {
            config,
            db: Arc::new(db),
            rates_tree: Arc::new(rates_tree),
        };

        tracing::info!(
            "Cache store opened with {} entries",
            store.rates_tree.len()
        );

        Ok(store)
    }

    /// Health check: exercise a write, read, and delete round trip
    pub async fn health_check(&self) -> Result<()> {
        let test_key = b"__health_check";
        let test_value = b"ok";

        self.rates_tree.insert(test_key, test_value).map_err(|e| {
            RatesError::StoreConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: format!("Health check write failed: {}", e),
            }
        })?;

        let result = self.rates_tree.get(test_key).map_err(|e| {
            RatesError::StoreConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: format!("Health check read failed: {}", e),
            }
        })?;

        if result.is_none() {
            return Err(RatesError::StoreConnectionFailed {
                db_path: self.config.db_path.to_string_lossy().to_string(),
                reason: "Health check value not found".to_string(),
            });
        }

        self.rates_tree.remove(test_key)?;
        Ok(())
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_entries: self.rates_tree.len(),
            database_size_bytes: self.db.size_on_disk()?,
        })
    }
}

#[async_trait]
impl RateCacheStore for SledCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        if let Some(value) = self.rates_tree.get(key.as_bytes())? {
            let entry: CacheEntry = bincode::deserialize(&value)?;
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let value = bincode::serialize(entry)?;
        self.rates_tree.insert(key.as_bytes(), value)?;

        tracing::debug!(
            "Stored cache entry {} ({} markets)",
            key,
            entry.rates.len()
        );
        Ok(())
    }
}
