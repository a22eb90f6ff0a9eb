//! LLM integration for content generation.
//!
//! Only one backend is needed: an OpenAI-compatible chat-completions endpoint
//! (OpenRouter by default), reached with reqwest.

pub mod openai;
pub mod provider;

pub use openai::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
/// Default model id.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let http = reqwest::Client::builder()
        .user_agent(concat!("outreach-dispatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: "openai-compat".to_string(),
            reason: format!("Failed to create HTTP client: {e}"),
        })?;

    tracing::info!("Using {} (model: {})", config.base_url, config.model);
    Ok(Arc::new(OpenAiCompatProvider::new(
        http,
        &config.base_url,
        config.api_key.clone(),
        &config.model,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_constructs_without_network() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "openai/gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "openai/gpt-4o");
    }
}
