//! LLM provider implementations for stylesmith.
//!
//! All providers implement the `stylesmith_core::Provider` trait.
//! `build_from_config` picks the endpoint from configuration.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use std::time::Duration;
use stylesmith_config::AppConfig;
use stylesmith_core::error::ProviderError;
use stylesmith_core::provider::Provider;

/// Build the configured model transport.
///
/// A missing API key is an error unless the endpoint is on the local machine.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let base_url = config.provider.api_url.as_str();
    let name = provider_name(base_url);

    let api_key = match (&config.api_key, is_local(base_url)) {
        (Some(key), _) => key.clone(),
        (None, true) => "local".to_string(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for {name}; set STYLESMITH_API_KEY or api_key in {}",
                AppConfig::config_path().display()
            )));
        }
    };

    Ok(Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        base_url,
        api_key,
        Duration::from_secs(config.provider.timeout_secs),
    )))
}

/// A short display name for well-known endpoints.
pub fn provider_name(base_url: &str) -> &'static str {
    if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains(":11434") {
        "ollama"
    } else {
        "openai-compatible"
    }
}

fn is_local(base_url: &str) -> bool {
    let host = base_url.split("://").nth(1).unwrap_or(base_url);
    ["localhost", "127.0.0.1", "[::1]", "0.0.0.0"]
        .iter()
        .any(|local| host.starts_with(local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names() {
        assert_eq!(provider_name("https://openrouter.ai/api/v1"), "openrouter");
        assert_eq!(provider_name("https://api.openai.com/v1"), "openai");
        assert_eq!(provider_name("http://localhost:11434/v1"), "ollama");
        assert_eq!(provider_name("https://llm.internal/v1"), "openai-compatible");
    }

    #[test]
    fn remote_endpoint_requires_key() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let mut config = AppConfig::default();
        config.provider.api_url = "http://localhost:11434/v1".into();
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn configured_key_builds_provider() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openrouter");
    }
}
