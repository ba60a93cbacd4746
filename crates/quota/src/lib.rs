//! Token estimation, allowance checks and usage tracking for LaBPrompT.
//!
//! Every paid model call passes through a [`QuotaGuard`]: the outgoing text
//! is estimated, an [`AllowanceService`] decides whether the estimate fits
//! the caller's budget, and after a successful call the actual usage is
//! recorded in a [`UsageStore`] in the background. Recording is advisory:
//! it never fails the call and concurrent updates for the same key may race.

pub mod allowance;
pub mod estimator;
pub mod guard;
pub mod model;
pub mod store;

pub use allowance::{AllowanceService, LimitAllowance, Unlimited};
pub use estimator::{CharHeuristicEstimator, TokenEstimator, estimate_tokens};
pub use guard::QuotaGuard;
pub use model::{Allowance, UsageKey, UsageRecord};
pub use store::{InMemoryUsageStore, UsageStore};

/// Errors from the quota subsystem.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    #[error("allowance service unavailable: {0}")]
    AllowanceUnavailable(String),

    #[error("usage store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl From<QuotaError> for labprompt_core::Error {
    fn from(e: QuotaError) -> Self {
        labprompt_core::Error::Backend(e.to_string())
    }
}
