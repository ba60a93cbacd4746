//! Error types for the LaBPrompT domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// HTTP status codes the provider uses for retry-eligible failures.
pub const TRANSIENT_STATUS_CODES: [u16; 4] = [429, 500, 502, 503];

/// Message fragments that mark a provider failure as retry-eligible.
pub const TRANSIENT_MESSAGE_MARKERS: [&str; 4] =
    ["overloaded", "try again later", "rate limit", "UNAVAILABLE"];

/// The top-level error type for all LaBPrompT operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Input validation (rejected before any external call) ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Payload too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    // --- Quota ---
    #[error("Quota exceeded: {reason}")]
    QuotaExceeded { reason: String },

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Response parsing ---
    #[error("Parse error: {0}")]
    Parse(String),

    // --- Auth / roles ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Hosted backend ---
    #[error("Backend error: {0}")]
    Backend(String),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry of the failed operation could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider(e) if e.is_transient())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Provider returned no content")]
    EmptyResponse,

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// The HTTP status (or provider error code) attached to this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { status_code, .. } => Some(*status_code),
            Self::RateLimited { .. } => Some(429),
            Self::AuthenticationFailed(_) => Some(401),
            _ => None,
        }
    }

    /// The raw provider message, without the variant's display prefix.
    pub fn message(&self) -> String {
        match self {
            Self::ApiError { message, .. } => message.clone(),
            Self::AuthenticationFailed(m)
            | Self::NotConfigured(m)
            | Self::Timeout(m)
            | Self::Network(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Transient-failure predicate: a retry-eligible status code, or a
    /// message carrying one of the known overload markers.
    pub fn is_transient(&self) -> bool {
        if let Some(code) = self.status_code() {
            if TRANSIENT_STATUS_CODES.contains(&code) {
                return true;
            }
        }
        let message = self.message();
        TRANSIENT_MESSAGE_MARKERS
            .iter()
            .any(|marker| message.contains(marker))
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn validation_error_names_field() {
        let err = Error::from(ValidationError::MissingField("persona"));
        assert!(err.to_string().contains("persona"));
    }

    #[test]
    fn transient_status_codes() {
        for code in [429, 500, 502, 503] {
            let err = ProviderError::ApiError {
                status_code: code,
                message: "boom".into(),
            };
            assert!(err.is_transient(), "{code} should be transient");
        }
        let forbidden = ProviderError::ApiError {
            status_code: 403,
            message: "PERMISSION_DENIED: key revoked".into(),
        };
        assert!(!forbidden.is_transient());
    }

    #[test]
    fn transient_message_markers() {
        let overloaded = ProviderError::Network("The model is overloaded".into());
        assert!(overloaded.is_transient());

        let unavailable = ProviderError::ApiError {
            status_code: 400,
            message: "UNAVAILABLE: backend draining".into(),
        };
        assert!(unavailable.is_transient());

        let unrelated = ProviderError::Network("connection reset by peer".into());
        assert!(!unrelated.is_transient());
    }

    #[test]
    fn rate_limited_is_transient() {
        let err = ProviderError::RateLimited { retry_after_secs: 5 };
        assert_eq!(err.status_code(), Some(429));
        assert!(err.is_transient());
        assert!(Error::from(err).is_transient());
    }

    #[test]
    fn auth_failure_is_not_transient() {
        let err = ProviderError::AuthenticationFailed("bad key".into());
        assert!(!err.is_transient());
    }
}
