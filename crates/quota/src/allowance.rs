//! Allowance services: decide whether an estimated call fits the budget.

use std::sync::Arc;

use async_trait::async_trait;
use labprompt_config::QuotaConfig;

use crate::QuotaError;
use crate::model::{Allowance, UsageKey};
use crate::store::UsageStore;

/// External quota/entitlement check consulted before every paid call.
#[async_trait]
pub trait AllowanceService: Send + Sync {
    async fn check(&self, key: &UsageKey, estimated_tokens: u64) -> Result<Allowance, QuotaError>;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl AllowanceService for Unlimited {
    async fn check(&self, _key: &UsageKey, _estimated_tokens: u64) -> Result<Allowance, QuotaError> {
        Ok(Allowance::allow())
    }
}

/// Static limits from configuration, checked against recorded usage.
///
/// A limit of 0 means unlimited.
pub struct LimitAllowance {
    max_tokens_per_call: u64,
    max_tokens_total: u64,
    max_calls: u64,
    usage: Arc<dyn UsageStore>,
}

impl LimitAllowance {
    pub fn new(config: &QuotaConfig, usage: Arc<dyn UsageStore>) -> Self {
        Self {
            max_tokens_per_call: config.max_tokens_per_call,
            max_tokens_total: config.max_tokens_total,
            max_calls: config.max_calls,
            usage,
        }
    }
}

#[async_trait]
impl AllowanceService for LimitAllowance {
    async fn check(&self, key: &UsageKey, estimated_tokens: u64) -> Result<Allowance, QuotaError> {
        if self.max_tokens_per_call > 0 && estimated_tokens > self.max_tokens_per_call {
            return Ok(Allowance::deny(format!(
                "request needs ~{estimated_tokens} tokens, per-call limit is {}",
                self.max_tokens_per_call
            )));
        }

        if self.max_tokens_total == 0 && self.max_calls == 0 {
            return Ok(Allowance::allow());
        }

        let (calls, tokens) = self
            .usage
            .get(key)
            .await?
            .map(|r| (r.calls, r.tokens))
            .unwrap_or((0, 0));

        if self.max_calls > 0 && calls >= self.max_calls {
            return Ok(Allowance::deny(format!(
                "call limit of {} reached",
                self.max_calls
            )));
        }

        let projected = tokens.saturating_add(estimated_tokens);
        if self.max_tokens_total > 0 && projected > self.max_tokens_total {
            return Ok(Allowance::deny(format!(
                "token budget exhausted: {tokens} used + ~{estimated_tokens} requested exceeds {}",
                self.max_tokens_total
            )));
        }

        Ok(Allowance::allow())
    }
}
