//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use labprompt_config::AppConfig;
use labprompt_core::error::ProviderError;
use labprompt_core::provider::Provider;
use tracing::info;

use crate::gemini::GeminiProvider;

/// Build the provider named in `config.provider.name`.
///
/// A missing API key is not an error here: the provider is still built and
/// reports [`ProviderError::NotConfigured`] on first use, so the server can
/// start and answer health checks without credentials.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider_config = &config.provider;
    match provider_config.name.as_str() {
        "gemini" | "google" => {
            let api_key = provider_config.api_key.clone().unwrap_or_default();
            let mut provider = GeminiProvider::with_timeout(
                api_key,
                Duration::from_secs(provider_config.timeout_secs),
            );
            if let Some(url) = &provider_config.api_url {
                provider = provider.with_base_url(url);
            }
            info!(
                provider = "gemini",
                model = %provider_config.model,
                base_url = %provider.base_url(),
                "Provider configured"
            );
            Ok(Arc::new(provider))
        }
        other => Err(ProviderError::NotConfigured(format!(
            "unknown provider '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let mut config = AppConfig::default();
        config.provider.name = "carrier-pigeon".into();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
