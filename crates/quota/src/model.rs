//! Data model for usage records and allowance decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies whose usage is being counted: the caller's API key id paired
/// with the provider that served the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageKey {
    pub api_key_id: String,
    pub provider: String,
}

impl UsageKey {
    pub fn new(api_key_id: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            provider: provider.into(),
        }
    }
}

impl std::fmt::Display for UsageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.api_key_id, self.provider)
    }
}

/// Cumulative usage for one [`UsageKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    #[serde(flatten)]
    pub key: UsageKey,
    pub calls: u64,
    pub tokens: u64,
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn empty(key: UsageKey) -> Self {
        Self {
            key,
            calls: 0,
            tokens: 0,
            updated_at: Utc::now(),
        }
    }

    /// Count one more completed call of `tokens` estimated tokens.
    pub fn add_call(&mut self, tokens: u64) {
        self.calls = self.calls.saturating_add(1);
        self.tokens = self.tokens.saturating_add(tokens);
        self.updated_at = Utc::now();
    }
}

/// The allowance service's answer for one estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Allowance {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}
