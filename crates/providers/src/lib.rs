//! Completion provider plumbing for RigChat.
//!
//! - [`OpenAiCompatProvider`] speaks the OpenAI chat/embeddings wire format
//! - [`CompletionClient`] adds defaults, timing, retry and streaming on top
//!   of any `rigchat_core::Provider`

pub mod client;
pub mod openai_compat;

use std::sync::Arc;

use rigchat_config::AppConfig;
use rigchat_core::error::ProviderError;
use rigchat_core::provider::Provider;

pub use client::{
    Completion, CompletionClient, CompletionDefaults, CompletionOptions, RetryPolicy, StreamSummary,
    TextStream,
};
pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// An API key is required unless the endpoint is on the local machine
/// (Ollama, vLLM, ...).
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let local = ["://localhost", "://127.0.0.1", "://[::1]"]
        .iter()
        .any(|h| config.api_url.contains(h));

    let api_key = match (&config.api_key, local) {
        (Some(key), _) => key.clone(),
        (None, true) => "local".into(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(
                "no API key: set RIGCHAT_API_KEY or OPENAI_API_KEY, or api_key in config.toml".into(),
            ));
        }
    };

    let provider = OpenAiCompatProvider::new(
        &config.provider_name,
        &config.api_url,
        api_key,
        config.completion.request_timeout(),
    )?;
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_endpoint_requires_key() {
        let config = AppConfig::default();
        let err = build_from_config(&config).err().expect("expected error");
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config = AppConfig {
            provider_name: "ollama".into(),
            api_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn configured_key_builds_provider() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        assert_eq!(build_from_config(&config).unwrap().name(), "openai");
    }
}
