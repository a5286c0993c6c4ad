// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Durable federator state: the scan cursor and the reverted vote ledger of
//! one chain pair.

use crate::error::{FederatorError, FederatorResult};
use crate::types::{ChainPair, RevertedTransactionRecord, TransactionIdentity};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub type RevertedLedger = BTreeMap<TransactionIdentity, RevertedTransactionRecord>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: &str) -> FederatorResult<Option<String>>;

    async fn save(&self, key: &str, value: &str) -> FederatorResult<()>;
}

/// One file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> FederatorResult<Option<String>> {
        match tokio::fs::read_to_string(self.root.join(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // Written to a temporary file first so a crash never leaves a truncated value.
    async fn save(&self, key: &str, value: &str) -> FederatorResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(key);
        let tmp = self.root.join(format!("{}.tmp", key));
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> FederatorResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> FederatorResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub struct ProgressStore {
    store: Arc<dyn KeyValueStore>,
    pair: ChainPair,
    from_block: u64,
}

impl ProgressStore {
    pub fn new(store: Arc<dyn KeyValueStore>, pair: ChainPair, from_block: u64) -> Self {
        Self {
            store,
            pair,
            from_block,
        }
    }

    pub fn cursor_key(pair: &ChainPair) -> String {
        format!("lastBlock_{}_{}.txt", pair.origin, pair.destination)
    }

    pub fn ledger_key(pair: &ChainPair) -> String {
        format!("revertedTxns_{}_{}.json", pair.origin, pair.destination)
    }

    async fn stored_cursor(&self) -> FederatorResult<Option<u64>> {
        let key = Self::cursor_key(&self.pair);
        match self.store.load(&key).await? {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
                FederatorError::StorageError(format!("Invalid cursor in {}: {:?} ({})", key, raw, e))
            }),
        }
    }

    /// Last origin block fully scanned. Never below the configured start.
    pub async fn last_block(&self) -> FederatorResult<u64> {
        Ok(self
            .stored_cursor()
            .await?
            .map_or(self.from_block, |cursor| cursor.max(self.from_block)))
    }

    /// Persists `block` as scanned. A value lower than the stored one is
    /// ignored.
    pub async fn save_last_block(&self, block: u64) -> FederatorResult<()> {
        if let Some(current) = self.stored_cursor().await? {
            if block < current {
                warn!(
                    "[{}] Ignoring cursor {} lower than stored {}",
                    self.pair, block, current
                );
                return Ok(());
            }
        }
        self.store
            .save(&Self::cursor_key(&self.pair), &block.to_string())
            .await?;
        debug!("[{}] Cursor saved at block {}", self.pair, block);
        Ok(())
    }

    pub async fn reverted(&self) -> FederatorResult<RevertedLedger> {
        let key = Self::ledger_key(&self.pair);
        match self.store.load(&key).await? {
            None => Ok(RevertedLedger::new()),
            Some(raw) if raw.trim().is_empty() => Ok(RevertedLedger::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                FederatorError::StorageError(format!("Invalid reverted ledger {}: {}", key, e))
            }),
        }
    }

    pub async fn is_reverted(&self, id: &TransactionIdentity) -> FederatorResult<bool> {
        Ok(self.reverted().await?.contains_key(id))
    }

    /// Appends a vote whose transaction was mined with a failed status.
    /// An existing entry for the same identity is kept.
    pub async fn record_reverted(
        &self,
        id: TransactionIdentity,
        record: RevertedTransactionRecord,
    ) -> FederatorResult<()> {
        let mut ledger = self.reverted().await?;
        if ledger.contains_key(&id) {
            return Ok(());
        }
        ledger.insert(id, record);
        let raw = serde_json::to_string_pretty(&ledger)
            .map_err(|e| FederatorError::StorageError(e.to_string()))?;
        self.store
            .save(&Self::ledger_key(&self.pair), &raw)
            .await?;
        info!("[{}] Recorded reverted vote {}", self.pair, id);
        Ok(())
    }
}
