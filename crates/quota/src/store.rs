//! Usage record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::QuotaError;
use crate::model::{UsageKey, UsageRecord};

/// Persistent (or not) storage of cumulative usage per key.
#[async_trait]
pub trait UsageStore: Send + Sync {
    async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, QuotaError>;

    async fn put(&self, record: UsageRecord) -> Result<(), QuotaError>;

    async fn list(&self) -> Result<Vec<UsageRecord>, QuotaError>;

    /// Add one call of `tokens` to the record for `key`.
    ///
    /// Read-then-write: two concurrent calls for the same key may both read
    /// the old value and one update is lost.
    async fn add_usage(&self, key: &UsageKey, tokens: u64) -> Result<UsageRecord, QuotaError> {
        let mut record = self
            .get(key)
            .await?
            .unwrap_or_else(|| UsageRecord::empty(key.clone()));
        record.add_call(tokens);
        self.put(record.clone()).await?;
        Ok(record)
    }
}

/// Process-local usage store.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    records: RwLock<HashMap<UsageKey, UsageRecord>>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageStore for InMemoryUsageStore {
    async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, QuotaError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: UsageRecord) -> Result<(), QuotaError> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UsageRecord>, QuotaError> {
        let mut records: Vec<UsageRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| {
            (&a.key.api_key_id, &a.key.provider).cmp(&(&b.key.api_key_id, &b.key.provider))
        });
        Ok(records)
    }
}
