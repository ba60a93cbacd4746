//! Token estimation.

/// Approximate token count for a piece of text.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> u64;
}

/// `ceil(chars / 4)`. Coarse, but stable and provider-independent.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharHeuristicEstimator;

impl TokenEstimator for CharHeuristicEstimator {
    fn estimate(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }
}

/// Estimate tokens as the character count divided by four, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
