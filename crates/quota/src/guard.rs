//! The quota guard wrapped around every paid model call.

use std::sync::Arc;

use labprompt_core::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::allowance::{AllowanceService, Unlimited};
use crate::estimator::{CharHeuristicEstimator, TokenEstimator};
use crate::model::{UsageKey, UsageRecord};
use crate::store::{InMemoryUsageStore, UsageStore};

/// Pre-call allowance check and post-call usage recording.
#[derive(Clone)]
pub struct QuotaGuard {
    estimator: Arc<dyn TokenEstimator>,
    allowance: Arc<dyn AllowanceService>,
    store: Arc<dyn UsageStore>,
    enabled: bool,
}

impl QuotaGuard {
    pub fn new(
        estimator: Arc<dyn TokenEstimator>,
        allowance: Arc<dyn AllowanceService>,
        store: Arc<dyn UsageStore>,
    ) -> Self {
        Self {
            estimator,
            allowance,
            store,
            enabled: true,
        }
    }

    /// A guard that allows everything and keeps usage in memory.
    pub fn unlimited() -> Self {
        Self::new(
            Arc::new(CharHeuristicEstimator),
            Arc::new(Unlimited),
            Arc::new(InMemoryUsageStore::new()),
        )
    }

    /// Skip the allowance check entirely. Usage is still recorded.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn estimate(&self, text: &str) -> u64 {
        self.estimator.estimate(text)
    }

    /// Estimate the call and ask the allowance service whether it fits.
    ///
    /// Returns the estimate on success. A denial becomes
    /// [`Error::QuotaExceeded`] carrying the service's reason; an allowance
    /// service that cannot be reached fails the call.
    pub async fn precheck(
        &self,
        key: &UsageKey,
        outgoing: &str,
        incoming: Option<&str>,
    ) -> Result<u64, Error> {
        let estimate = self.estimate(outgoing) + incoming.map_or(0, |t| self.estimate(t));
        if !self.enabled {
            return Ok(estimate);
        }

        let allowance = self.allowance.check(key, estimate).await?;
        if !allowance.allowed {
            let reason = allowance
                .reason
                .unwrap_or_else(|| "allowance service declined the request".into());
            info!(key = %key, estimate, reason = %reason, "Quota check denied call");
            return Err(Error::QuotaExceeded { reason });
        }

        debug!(key = %key, estimate, "Quota check passed");
        Ok(estimate)
    }

    /// Record the actual usage of a completed call in the background.
    ///
    /// Failures are logged and never reach the caller. The returned handle
    /// only exists so tests can wait for the write.
    pub fn record(&self, key: UsageKey, outgoing: &str, incoming: &str) -> JoinHandle<()> {
        let tokens = self.estimate(outgoing) + self.estimate(incoming);
        let store = self.store.clone();
        tokio::spawn(async move {
            match store.add_usage(&key, tokens).await {
                Ok(record) => debug!(
                    key = %key,
                    tokens,
                    total_tokens = record.tokens,
                    calls = record.calls,
                    "Usage recorded"
                ),
                Err(e) => warn!(key = %key, tokens, error = %e, "Failed to record usage"),
            }
        })
    }

    /// All usage records known to the store.
    pub async fn usage(&self) -> Result<Vec<UsageRecord>, Error> {
        Ok(self.store.list().await?)
    }
}
