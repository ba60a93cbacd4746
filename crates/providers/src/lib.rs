//! Generative-AI provider implementations for LaBPrompT.
//!
//! All providers implement the `labprompt_core::Provider` trait.
//! [`build_from_config`] picks the implementation named in configuration,
//! and [`retry`] wraps calls in exponential backoff for transient failures,
//! either around any async operation or as a [`RetryingProvider`] decorator.

pub mod builder;
pub mod gemini;
pub mod retry;

pub use builder::build_from_config;
pub use gemini::GeminiProvider;
pub use retry::{RetryPolicy, Retryable, RetryingProvider, with_retry};
