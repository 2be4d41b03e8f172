//! Provider selection: builds the configured completion backend.

use std::sync::Arc;
use std::time::Duration;
use toolrelay_config::{AppConfig, ProviderKind};
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::Provider;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryProvider;

/// Build the provider described by `config.provider`.
///
/// Wraps it in a [`RetryProvider`] when more than one attempt is configured.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let settings = &config.provider;
    let timeout = Duration::from_secs(settings.request_timeout_secs);

    let provider: Arc<dyn Provider> = match settings.kind {
        ProviderKind::Openai => Arc::new(OpenAiCompatProvider::new(
            "openai",
            &settings.endpoint,
            settings.api_key.clone().unwrap_or_default(),
            timeout,
        )?),
        ProviderKind::Azure => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                ProviderError::NotConfigured("Azure provider requires an API key".into())
            })?;
            let api_version = settings.api_version.clone().ok_or_else(|| {
                ProviderError::NotConfigured("Azure provider requires an api_version".into())
            })?;
            Arc::new(OpenAiCompatProvider::azure(
                &settings.endpoint,
                api_key,
                api_version,
                timeout,
            )?)
        }
    };

    debug!(
        provider = provider.name(),
        model = %settings.model,
        max_attempts = settings.max_attempts,
        "Built completion provider"
    );

    if settings.max_attempts > 1 {
        Ok(Arc::new(RetryProvider::new(provider, settings.max_attempts)))
    } else {
        Ok(provider)
    }
}
