//! Quota integration: usage rows and the allowance procedure.

use async_trait::async_trait;
use chrono::Utc;
use labprompt_quota::{Allowance, AllowanceService, QuotaError, UsageKey, UsageRecord, UsageStore};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::{BackendClient, Filter};

const ALLOWANCE_FUNCTION: &str = "check_allowance";

#[derive(Debug, Deserialize)]
struct UsageRow {
    api_key_id: String,
    provider: String,
    #[serde(default)]
    calls: u64,
    #[serde(default)]
    tokens: u64,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<Utc>>,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            key: UsageKey::new(row.api_key_id, row.provider),
            calls: row.calls,
            tokens: row.tokens,
            updated_at: row.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

fn decode_rows(rows: Vec<Value>) -> Result<Vec<UsageRecord>, QuotaError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value::<UsageRow>(row)
                .map(UsageRecord::from)
                .map_err(QuotaError::from)
        })
        .collect()
}

/// Usage counters in a backend table keyed by `(api_key_id, provider)`.
pub struct BackendUsageStore {
    client: BackendClient,
    table: String,
}

impl BackendUsageStore {
    pub fn new(client: BackendClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl UsageStore for BackendUsageStore {
    async fn get(&self, key: &UsageKey) -> Result<Option<UsageRecord>, QuotaError> {
        let rows = self
            .client
            .select(
                &self.table,
                "*",
                &[
                    Filter::eq("api_key_id", &key.api_key_id),
                    Filter::eq("provider", &key.provider),
                ],
            )
            .await?;
        Ok(decode_rows(rows)?.into_iter().next())
    }

    async fn put(&self, record: UsageRecord) -> Result<(), QuotaError> {
        let row = json!({
            "api_key_id": record.key.api_key_id,
            "provider": record.key.provider,
            "calls": record.calls,
            "tokens": record.tokens,
            "updated_at": record.updated_at,
        });
        self.client
            .upsert(&self.table, &row, "api_key_id,provider")
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UsageRecord>, QuotaError> {
        let rows = self.client.select(&self.table, "*", &[]).await?;
        decode_rows(rows)
    }
}

/// Allowance decided by the backend's `check_allowance` procedure.
///
/// The procedure receives the key and the estimate and answers
/// `{ "allowed": bool, "reason": string | null }`.
pub struct BackendAllowance {
    client: BackendClient,
}

impl BackendAllowance {
    pub fn new(client: BackendClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AllowanceService for BackendAllowance {
    async fn check(&self, key: &UsageKey, estimated_tokens: u64) -> Result<Allowance, QuotaError> {
        let args = json!({
            "p_api_key_id": key.api_key_id,
            "p_provider": key.provider,
            "p_estimated_tokens": estimated_tokens,
        });
        let value = self
            .client
            .rpc(ALLOWANCE_FUNCTION, &args)
            .await
            .map_err(|e| QuotaError::AllowanceUnavailable(e.to_string()))?;

        // Set-returning procedures answer with a one-element array.
        let value = match value {
            Value::Array(mut rows) if !rows.is_empty() => rows.swap_remove(0),
            other => other,
        };
        Ok(serde_json::from_value(value)?)
    }
}
